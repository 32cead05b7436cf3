//! Command-line interface definitions using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use cloudflare_kv::StorageProvider;

/// Manage racket short links
#[derive(Debug, Parser)]
#[command(name = "racket-links")]
#[command(version)]
#[command(about = "Create, list and delete short links", long_about = None)]
pub struct Cli {
    /// Public base URL of the redirect server, used to print short URLs
    #[arg(
        long,
        env = "RACKET_WORKER_URL",
        default_value = "http://localhost:8787",
        global = true
    )]
    pub worker_url: String,

    /// Local CSV copy of all mappings
    #[arg(
        long,
        env = "RACKET_CSV_FILE",
        default_value = "./url-mappings.csv",
        global = true
    )]
    pub csv_file: PathBuf,

    /// Backing store: `cloudflare` or `memory`
    #[arg(long, env = "STORAGE_PROVIDER", default_value = "cloudflare", global = true)]
    pub storage: StorageProvider,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List all mappings
    List,

    /// Find mappings whose code or URL contains the term
    Search {
        /// Case-insensitive search term
        term: String,
    },

    /// Create a short link; a 6-character code is generated unless --code is given
    Create {
        /// Destination URL (http or https)
        long_url: String,

        /// Custom short code
        #[arg(long)]
        code: Option<String>,

        #[command(flatten)]
        utm: UtmArgs,
    },

    /// Point an existing (or new) code at another URL
    Update {
        short_code: String,

        long_url: String,

        #[command(flatten)]
        utm: UtmArgs,
    },

    /// Delete a short link
    Delete {
        short_code: String,

        /// Confirm the deletion; it cannot be undone
        #[arg(long)]
        yes: bool,
    },

    /// Write all mappings from the store to a CSV file
    Export {
        /// Output path (default: the configured CSV file)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Re-read the store and rewrite the CSV file
    Refresh,
}

#[derive(Debug, Default, Args)]
pub struct UtmArgs {
    #[arg(long)]
    pub utm_source: Option<String>,
    #[arg(long)]
    pub utm_medium: Option<String>,
    #[arg(long)]
    pub utm_campaign: Option<String>,
    /// Tag to attach; repeat for several
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["racket-links", "--storage", "memory"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn create_with_code_and_utm() {
        let cli = parse(&[
            "create",
            "https://example.com",
            "--code",
            "promo",
            "--utm-source",
            "news",
            "--tag",
            "a",
            "--tag",
            "b",
        ]);
        match cli.command {
            Command::Create { long_url, code, utm } => {
                assert_eq!(long_url, "https://example.com");
                assert_eq!(code.as_deref(), Some("promo"));
                assert_eq!(utm.utm_source.as_deref(), Some("news"));
                assert!(utm.utm_medium.is_none());
                assert_eq!(utm.tags, vec!["a", "b"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(cli.storage, StorageProvider::Memory);
    }

    #[test]
    fn delete_defaults_to_unconfirmed() {
        let cli = parse(&["delete", "promo"]);
        assert!(matches!(cli.command, Command::Delete { yes: false, .. }));
        let cli = parse(&["delete", "promo", "--yes"]);
        assert!(matches!(cli.command, Command::Delete { yes: true, .. }));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["list", "--csv-file", "/tmp/x.csv", "--worker-url", "https://s.example"]);
        assert_eq!(cli.csv_file, PathBuf::from("/tmp/x.csv"));
        assert_eq!(cli.worker_url, "https://s.example");
    }

    #[test]
    fn rejects_unknown_storage_and_missing_args() {
        assert!(Cli::try_parse_from(["racket-links", "--storage", "s3", "list"]).is_err());
        assert!(Cli::try_parse_from(["racket-links", "update", "only-code"]).is_err());
    }
}
