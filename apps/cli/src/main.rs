//! politdocs CLI: enrich the municipal council business records.
//!
//! Scrapes the council business table, links related items, downloads and
//! summarizes each business's PDF and writes the result set plus a slim
//! projection for the static frontend.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::run(cli).await
}
