use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hoard", version, about = "Catalog and fetch a local image collection")]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON). Defaults to the platform
    /// configuration directory.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes
    /// precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Ignore the inventory cache and rebuild from storage and snapshots.
    #[arg(long, global = true)]
    pub rescan: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rebuild the inventory and save it to the cache.
    Reconcile,
    /// Download images into the library.
    Fetch(FetchArgs),
    /// Print one status line per asset.
    Show {
        /// Only show these ids (case-insensitive).
        ids: Vec<String>,
    },
}

#[derive(Debug, clap::Args)]
pub struct FetchArgs {
    /// URLs to download.
    pub urls: Vec<String>,

    /// Read further URLs from a file, one per line. Blank lines and lines
    /// starting with `#` are ignored.
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Download directory. Defaults to the configured destination.
    #[arg(short, long, value_name = "DIR")]
    pub destination: Option<PathBuf>,

    /// Transport to download with.
    #[arg(short, long)]
    pub transport: Option<String>,

    /// Number of downloads to run at once.
    #[arg(long)]
    pub concurrency: Option<usize>,
}

/// Extracts URLs from the contents of a URL list file.
pub fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fetch_arguments() {
        let cli = Cli::try_parse_from([
            "hoard",
            "-vv",
            "fetch",
            "https://example.com/a.jpg",
            "https://example.com/b.jpg",
            "--file",
            "urls.txt",
            "--transport",
            "secondary",
            "--concurrency",
            "4",
            "--rescan",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.rescan);
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.urls.len(), 2);
        assert_eq!(args.file, Some(PathBuf::from("urls.txt")));
        assert_eq!(args.transport.as_deref(), Some("secondary"));
        assert_eq!(args.concurrency, Some(4));
        assert_eq!(args.destination, None);
    }

    #[rstest]
    #[case(&["hoard"])]
    #[case(&["hoard", "download"])]
    #[case(&["hoard", "fetch", "--concurrency", "many"])]
    fn test_misuse_is_rejected(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_url_list() {
        let contents = "# favourites\nhttps://example.com/a.jpg\n\n   https://example.com/b.jpg  \n#https://example.com/c.jpg\n";
        assert_eq!(parse_url_list(contents), ["https://example.com/a.jpg", "https://example.com/b.jpg"]);
    }
}
