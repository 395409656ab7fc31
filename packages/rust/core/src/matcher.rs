//! Fuzzy title matcher.
//!
//! Responses ("Beantwortung ...") usually repeat the title of the business
//! they answer, so a high partial similarity between two titles links them.
//! Links are derived fresh on every run and never persisted on their own.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use politdocs_shared::{RawItem, RelatedItemLink};

/// A pair is linked when the rounded partial ratio exceeds this.
pub const LINK_THRESHOLD: u32 = 95;

/// Protocol items never originate a link. They can still be linked to by an
/// earlier item, so the exclusion depends on item order.
const EXCLUDED_ORIGIN: &str = "gemeindeparlament";

/// Compute related-item links for every item, keyed by `item_id`.
///
/// Every item gets an entry, possibly empty. Links are attached to both
/// ends of a pair, in item order.
#[instrument(skip_all, fields(items = items.len()))]
pub fn related_links(items: &[RawItem]) -> HashMap<String, Vec<RelatedItemLink>> {
    let lowered: Vec<String> = items.iter().map(|item| item.title.to_lowercase()).collect();
    let titles: Vec<Vec<char>> = lowered.iter().map(|t| t.chars().collect()).collect();

    let mut links: Vec<Vec<RelatedItemLink>> = vec![Vec::new(); items.len()];
    let mut pairs = 0usize;

    for i1 in 0..items.len() {
        if lowered[i1].contains(EXCLUDED_ORIGIN) {
            continue;
        }
        for i2 in (i1 + 1)..items.len() {
            let ratio = partial_ratio_chars(&titles[i1], &titles[i2]);
            if ratio > LINK_THRESHOLD {
                links[i1].push(link_to(&items[i2]));
                links[i2].push(link_to(&items[i1]));
                pairs += 1;
            }
        }
    }

    debug!(pairs, "linked related items");

    items
        .iter()
        .zip(links)
        .map(|(item, links)| (item.item_id.clone(), links))
        .collect()
}

/// Overwrite each item's `related_items` with the computed links.
pub fn apply_links(items: &mut [RawItem], mut links: HashMap<String, Vec<RelatedItemLink>>) {
    for item in items {
        item.related_items = links.remove(&item.item_id).unwrap_or_default();
    }
}

/// Compute and apply links in one go.
pub fn link_related_items(items: &mut [RawItem]) {
    let links = related_links(items);
    apply_links(items, links);
}

fn link_to(item: &RawItem) -> RelatedItemLink {
    RelatedItemLink {
        item_id: item.item_id.clone(),
        title: item.title.clone(),
    }
}

// ---------------------------------------------------------------------------
// Partial ratio
// ---------------------------------------------------------------------------

/// Best similarity (0..=100, rounded) between the shorter string and any
/// alignment of it inside the longer one.
///
/// Alignments are the full-length windows of the longer string plus the
/// windows hanging over its start or end. Each window is scored with the
/// normalized indel similarity `2 * lcs / (len_a + len_b)`.
pub fn partial_ratio(a: &str, b: &str) -> u32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    partial_ratio_chars(&a, &b)
}

fn partial_ratio_chars(a: &[char], b: &[char]) -> u32 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let score = if a.len() == b.len() {
        best_alignment(a, b).max(best_alignment(b, a))
    } else if a.len() < b.len() {
        best_alignment(a, b)
    } else {
        best_alignment(b, a)
    };

    (score * 100.0).round() as u32
}

/// Maximum window similarity of `needle` against `haystack` (needle not longer).
fn best_alignment(needle: &[char], haystack: &[char]) -> f64 {
    let pattern = Pattern::new(needle);
    let in_needle: HashSet<char> = needle.iter().copied().collect();
    let n = needle.len();
    let h = haystack.len();
    let score = |window: &[char]| 2.0 * pattern.lcs(window) as f64 / (n + window.len()) as f64;

    // Windows overhanging the start. One ending in a char absent from the
    // needle can't beat the shorter window before it.
    let head = (1..n)
        .filter(|&end| in_needle.contains(&haystack[end - 1]))
        .map(|end| &haystack[..end]);
    let full = (0..=(h - n)).map(|start| &haystack[start..start + n]);
    // Windows overhanging the end.
    let tail = ((h - n + 1)..h)
        .filter(|&start| in_needle.contains(&haystack[start]))
        .map(|start| &haystack[start..]);

    let mut best = 0.0f64;
    for window in head.chain(full).chain(tail) {
        best = best.max(score(window));
        if best >= 1.0 {
            break;
        }
    }
    best
}

/// Bit-parallel longest common subsequence against a fixed pattern.
///
/// One bit per pattern char, split into 64-bit blocks; each text char costs
/// one add, one subtract and one or per block.
struct Pattern {
    len: usize,
    blocks: usize,
    masks: HashMap<char, Vec<u64>>,
}

impl Pattern {
    fn new(chars: &[char]) -> Self {
        let blocks = chars.len().div_ceil(64).max(1);
        let mut masks: HashMap<char, Vec<u64>> = HashMap::new();
        for (i, c) in chars.iter().enumerate() {
            masks.entry(*c).or_insert_with(|| vec![0; blocks])[i / 64] |= 1u64 << (i % 64);
        }
        Self {
            len: chars.len(),
            blocks,
            masks,
        }
    }

    fn lcs(&self, text: &[char]) -> usize {
        let mut s = vec![u64::MAX; self.blocks];

        for c in text {
            let Some(mask) = self.masks.get(c) else {
                continue;
            };
            let mut carry = false;
            let mut borrow = false;
            for (word, m) in s.iter_mut().zip(mask) {
                let u = *word & m;

                let (sum, c1) = word.overflowing_add(u);
                let (sum, c2) = sum.overflowing_add(carry as u64);
                carry = c1 || c2;

                let (diff, b1) = word.overflowing_sub(u);
                let (diff, b2) = diff.overflowing_sub(borrow as u64);
                borrow = b1 || b2;

                *word = sum | diff;
            }
        }

        // Zero bits within the pattern length are matched positions.
        let mut lcs = 0;
        for (block, word) in s.iter().enumerate() {
            let bits = (self.len - block * 64).min(64);
            let valid = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
            lcs += bits - (word & valid).count_ones() as usize;
        }
        lcs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, title: &str) -> RawItem {
        RawItem {
            item_id: id.into(),
            item_url: format!("https://www.schlieren.ch/politbusiness/{id}"),
            title: title.into(),
            category: "Postulat".into(),
            date: "2023-01-01".into(),
            related_items: Vec::new(),
        }
    }

    fn ids(links: &[RelatedItemLink]) -> Vec<&str> {
        links.iter().map(|l| l.item_id.as_str()).collect()
    }

    /// Plain quadratic LCS as a reference for the bit-parallel one.
    fn lcs_reference(a: &[char], b: &[char]) -> usize {
        let mut prev = vec![0usize; b.len() + 1];
        for ca in a {
            let mut cur = vec![0usize; b.len() + 1];
            for (j, cb) in b.iter().enumerate() {
                cur[j + 1] = if ca == cb {
                    prev[j] + 1
                } else {
                    prev[j + 1].max(cur[j])
                };
            }
            prev = cur;
        }
        prev[b.len()]
    }

    // -----------------------------------------------------------------------
    // Partial ratio
    // -----------------------------------------------------------------------

    #[test]
    fn contained_string_scores_full() {
        assert_eq!(partial_ratio("this is a test", "this is a test!"), 100);
        assert_eq!(
            partial_ratio(
                "postulat betreffend velowege",
                "beantwortung postulat betreffend velowege"
            ),
            100
        );
    }

    #[test]
    fn partial_ratio_values() {
        assert_eq!(partial_ratio("abcd", "abxd"), 75);
        assert_eq!(partial_ratio("abcd", "xyz"), 0);
        assert_eq!(partial_ratio("", "abc"), 0);
        assert_eq!(partial_ratio("", ""), 0);
    }

    #[test]
    fn partial_ratio_is_symmetric() {
        let pairs = [
            ("interpellation schulhaus", "antwort interpellation schulhaus zelgli"),
            ("kleine anfrage", "kleine anfrage betreffend"),
            ("budget 2024", "budget 2023"),
        ];
        for (a, b) in pairs {
            assert_eq!(partial_ratio(a, b), partial_ratio(b, a), "{a} / {b}");
        }
    }

    #[test]
    fn bit_parallel_lcs_matches_reference() {
        let long: String = "gemeindeparlament beschluss über die jahresrechnung "
            .repeat(4);
        let cases = [
            ("abcbdab", "bdcaba"),
            ("velowege", "beantwortung velowege"),
            (long.as_str(), "beschluss jahresrechnung gemeindeparlament"),
            ("äöü straße", "strasse äöü"),
        ];
        for (a, b) in cases {
            let a: Vec<char> = a.chars().collect();
            let b: Vec<char> = b.chars().collect();
            assert_eq!(Pattern::new(&a).lcs(&b), lcs_reference(&a, &b));
        }
    }

    // -----------------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------------

    #[test]
    fn links_response_both_ways() {
        let items = vec![
            item("1", "Postulat betreffend velowege"),
            item("2", "Interpellation zum budget"),
            item("3", "Beantwortung postulat betreffend velowege"),
        ];
        let links = related_links(&items);

        assert_eq!(ids(&links["1"]), vec!["3"]);
        assert_eq!(ids(&links["3"]), vec!["1"]);
        assert!(links["2"].is_empty());
        assert_eq!(links["1"][0].title, "Beantwortung postulat betreffend velowege");
    }

    #[test]
    fn links_are_symmetric() {
        let items = vec![
            item("1", "Kleine anfrage betreffend schulraum"),
            item("2", "Antwort kleine anfrage betreffend schulraum"),
            item("3", "Kleine anfrage betreffend schulraum (ergänzung)"),
            item("4", "Motion parkplätze"),
        ];
        let links = related_links(&items);

        for (id, targets) in &links {
            for target in targets {
                assert!(
                    links[&target.item_id].iter().any(|l| &l.item_id == id),
                    "{id} -> {} not mirrored",
                    target.item_id
                );
            }
        }
    }

    #[test]
    fn gemeindeparlament_never_originates_a_link() {
        let parlament = item("10", "Protokoll gemeindeparlament sitzung vom 12. juni 2023");
        let sitzung = item("11", "Sitzung vom 12. juni 2023");

        // Protocol first: it would be the origin, so nothing is linked.
        let links = related_links(&[parlament.clone(), sitzung.clone()]);
        assert!(links["10"].is_empty());
        assert!(links["11"].is_empty());

        // Protocol second: the earlier item originates, both ends get a link.
        let links = related_links(&[sitzung, parlament]);
        assert_eq!(ids(&links["11"]), vec!["10"]);
        assert_eq!(ids(&links["10"]), vec!["11"]);
    }

    #[test]
    fn apply_links_replaces_existing() {
        let mut items = vec![
            item("1", "Postulat betreffend velowege"),
            item("2", "Beantwortung postulat betreffend velowege"),
        ];
        items[0].related_items = vec![RelatedItemLink {
            item_id: "stale".into(),
            title: "stale".into(),
        }];

        link_related_items(&mut items);

        assert_eq!(ids(&items[0].related_items), vec!["2"]);
        assert_eq!(ids(&items[1].related_items), vec!["1"]);
    }
}
