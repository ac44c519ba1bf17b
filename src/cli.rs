use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "skytrack", version, about = "Track live aircraft and forget the ones that go quiet")]
pub struct Cli {
    /// Configuration file (defaults to `skytrack.toml` in the platform config directory).
    #[arg(long, short, global = true, env = "SKYTRACK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Database file, overriding the configuration.
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upsert a feed batch: a JSON document `{"positions": [...], "static": [...]}`.
    Ingest {
        /// Batch file, or `-` for standard input.
        file: PathBuf,
    },
    /// Print the live aircraft of one manufacturer as JSON lines.
    Query { manufacturer: String },
    /// Print per-manufacturer row counts as JSON lines.
    Groups,
    /// Delete every tracked aircraft of one manufacturer.
    Clear { manufacturer: String },
    /// Delete stale rows now instead of waiting for the sweeper.
    Sweep,
    /// Check that the database answers.
    Health,
    /// Keep the store open (and the sweeper running) until Ctrl-C.
    Run,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["skytrack", "query", "Cessna", "--database", "/tmp/t.db"]).unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/t.db")));
        assert!(matches!(cli.command, Command::Query { manufacturer } if manufacturer == "Cessna"));
    }
}
