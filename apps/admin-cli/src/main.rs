//! racket-links: manage short links from the terminal.
//!
//! Talks to the same key-value store as the redirect server and keeps a
//! CSV copy of all mappings next to you.
//!
//! ```bash
//! racket-links list
//! racket-links create https://example.com --code promo --utm-source news
//! racket-links delete promo --yes
//! ```

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use cloudflare_kv::KvBackend;
use colored::Colorize;
use domain::Mapping;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::commands::{Manager, Source};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let store = KvBackend::from_provider(cli.storage).context("opening key-value store")?;
    tracing::debug!(provider = ?store.provider(), "store selected");
    let manager = Manager::new(store, cli.csv_file, &cli.worker_url);

    match cli.command {
        Command::List => {
            let (rows, source) = manager.list().await?;
            print_source(source, &manager);
            print_table(&rows);
            println!("{} {} mappings", "✓".green(), rows.len());
        }
        Command::Search { term } => {
            let (rows, source) = manager.search(&term).await?;
            print_source(source, &manager);
            if rows.is_empty() {
                println!("{}", "No matches found.".dimmed());
            } else {
                print_table(&rows);
                println!("{} Found {} matches", "✓".green(), rows.len());
            }
        }
        Command::Create { long_url, code, utm } => {
            let m = manager.create(&long_url, code.as_deref(), utm).await?;
            println!("{} Short URL created", "✓".bold().green());
            println!("  Short URL: {}", manager.short_url(&m.short_code).cyan());
            println!("  Long URL:  {}", m.long_url.dimmed());
        }
        Command::Update {
            short_code,
            long_url,
            utm,
        } => {
            let m = manager.update(&short_code, &long_url, utm).await?;
            println!(
                "{} Updated {} -> {}",
                "✓".bold().green(),
                m.short_code.cyan(),
                m.long_url.blue().underline()
            );
        }
        Command::Delete { short_code, yes } => {
            manager.delete(&short_code, yes).await?;
            println!("{} Deleted {}", "✓".bold().green(), short_code.cyan());
        }
        Command::Export { file } => {
            let (count, path) = manager.export(file).await?;
            println!(
                "{} Exported {} mappings to {}",
                "✓".bold().green(),
                count,
                path.display()
            );
        }
        Command::Refresh => {
            let (count, path) = manager.export(None).await?;
            println!(
                "{} Loaded {} mappings, {} rewritten",
                "✓".bold().green(),
                count,
                path.display()
            );
        }
    }
    Ok(())
}

fn print_source<S: domain::KvStore>(source: Source, manager: &Manager<S>) {
    if source == Source::CsvFallback {
        println!(
            "{} store unavailable, showing {}",
            "⚠".yellow(),
            manager.csv_path().display()
        );
    }
}

fn print_table(rows: &[Mapping]) {
    for m in rows {
        let utm = [&m.utm_source, &m.utm_medium, &m.utm_campaign]
            .iter()
            .filter(|v| !v.is_empty())
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("/");
        if utm.is_empty() {
            println!("{:<25} → {}", m.short_code.cyan(), m.long_url.dimmed());
        } else {
            println!(
                "{:<25} → {} {}",
                m.short_code.cyan(),
                m.long_url.dimmed(),
                format!("[{}]", utm).yellow()
            );
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
