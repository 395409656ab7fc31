//! HTTP fetching with a fixed-interval retry policy.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use politdocs_shared::{FetchConfig, PolitdocsError, Result, RetryPolicy, error_chain};

/// User-Agent string for all requests.
const USER_AGENT: &str = concat!("politdocs/", env!("CARGO_PKG_VERSION"));

/// Blocking-per-call HTTP fetcher shared by the source extractor,
/// the detail enricher and the PDF download.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
}

impl Fetcher {
    /// Create a fetcher with the given connect/read timeout and retry policy.
    ///
    /// The timeout bounds connecting and each read, not the whole transfer,
    /// so a large PDF that keeps arriving is never cut off.
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| PolitdocsError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, policy })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        Self::new(config.timeout(), config.retry_policy())
    }

    /// GET `url` and return the body as text.
    #[instrument(skip(self))]
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.with_retry(url, || async {
            let response = self.get_ok(url).await?;
            response
                .text()
                .await
                .map_err(|e| body_error(url, &e))
        })
        .await
    }

    /// GET `url` and return the raw body.
    #[instrument(skip(self))]
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.with_retry(url, || async {
            let response = self.get_ok(url).await?;
            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| body_error(url, &e))
        })
        .await
    }

    /// Download `url` into `path`, overwriting any existing file.
    pub async fn download(&self, url: &str, path: &Path) -> Result<()> {
        let bytes = self.get_bytes(url).await?;
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| PolitdocsError::io(path, e))?;
        debug!(%url, path = %path.display(), size = bytes.len(), "downloaded file");
        Ok(())
    }

    async fn get_ok(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PolitdocsError::Fetch(format!("{url}: {}", error_chain(&e))))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PolitdocsError::Fetch(format!("{url}: HTTP {status}")));
        }
        Ok(response)
    }

    async fn with_retry<T, F, Fut>(&self, url: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.policy.run(url, op).await.map_err(|exhausted| {
            PolitdocsError::Fetch(format!(
                "fetching {url} failed after {} retries: {}",
                exhausted.retries, exhausted.last
            ))
        })
    }
}

fn body_error(url: &str, error: &reqwest::Error) -> PolitdocsError {
    PolitdocsError::Fetch(format!("{url}: body read failed: {}", error_chain(error)))
}

// ---------------------------------------------------------------------------
// URL helpers
// ---------------------------------------------------------------------------

/// Rightmost path segment of a resource URL, trailing slashes ignored.
///
/// For REST-style URLs this is the resource identifier.
pub fn rightmost_url_part(url: &str) -> String {
    let trimmed = url.trim_matches('/');
    trimmed
        .rsplit_once('/')
        .map_or(trimmed, |(_, last)| last)
        .to_string()
}

/// Scheme and host of `url`, e.g. `https://www.schlieren.ch`.
pub fn url_root(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| PolitdocsError::parse(format!("invalid URL '{url}': {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| PolitdocsError::parse(format!("URL '{url}' has no host")))?;
    Ok(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(retries: u32) -> Fetcher {
        Fetcher::new(
            Duration::from_secs(5),
            RetryPolicy::fixed(retries, Duration::ZERO),
        )
        .unwrap()
    }

    #[test]
    fn test_rightmost_url_part() {
        assert_eq!(
            rightmost_url_part("https://www.schlieren.ch/politbusiness/12345"),
            "12345"
        );
        assert_eq!(
            rightmost_url_part("https://www.schlieren.ch/_doc/998877/"),
            "998877"
        );
        assert_eq!(rightmost_url_part("plain"), "plain");
    }

    #[test]
    fn test_url_root() {
        assert_eq!(
            url_root("https://www.schlieren.ch/politbusiness?x=1").unwrap(),
            "https://www.schlieren.ch"
        );
        assert_eq!(
            url_root("http://127.0.0.1:8080/a/b").unwrap(),
            "http://127.0.0.1:8080"
        );
        assert!(url_root("not a url").is_err());
    }

    #[tokio::test]
    async fn get_text_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&server)
            .await;

        let body = fetcher(0)
            .get_text(&format!("{}/page", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<html>hi</html>");
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("finally"))
            .mount(&server)
            .await;

        let body = fetcher(5)
            .get_text(&format!("{}/flaky", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "finally");
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher(2)
            .get_text(&format!("{}/down", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, PolitdocsError::Fetch(_)));
        assert!(err.to_string().contains("after 2 retries"));
    }

    #[tokio::test]
    async fn download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_doc/42"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 fake".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("42.pdf");
        fetcher(0)
            .download(&format!("{}/_doc/42", server.uri()), &target)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.4 fake");
    }

    #[tokio::test]
    async fn unreachable_host_reports_cause() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let err = fetcher(0)
            .get_text(&format!("http://127.0.0.1:{port}/gone"))
            .await
            .unwrap_err();
        let message = err.to_string().to_lowercase();
        assert!(message.contains("error sending request"), "{message}");
        assert!(message.contains("connect"), "{message}");
    }

    #[tokio::test]
    async fn slow_steady_body_outlasts_timeout() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = b"%PDF-1.4 langsam....";

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            for byte in body {
                socket.write_all(&[*byte]).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
        });

        // Every gap is well under the timeout, the whole transfer is not.
        let fetcher = Fetcher::new(Duration::from_secs(1), RetryPolicy::none()).unwrap();
        let bytes = fetcher
            .get_bytes(&format!("http://{addr}/_doc/slow"))
            .await
            .unwrap();
        assert_eq!(bytes, body);
    }
}
