//! Command line definition

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use shelf_core::ShelfConfig;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "shelf", version)]
#[command(about = "Track album directories through a beets import pipeline", long_about = None)]
pub struct Cli {
    /// Configuration file (default: <config dir>/shelf/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the lock, database and scratch files
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory whose subdirectories are albums
    #[arg(long, global = true)]
    pub albums_dir: Option<PathBuf>,

    /// External tagging tool
    #[arg(long, global = true)]
    pub tool: Option<String>,

    /// Time limit for one tool run, in seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Record every existing album, classified against a cutoff time
    Setup {
        /// Albums modified after this RFC 3339 time start out pending
        #[arg(long, value_parser = parse_rfc3339)]
        cutoff_time: DateTime<Utc>,

        /// Import log from an earlier manual run; its skips become skipped
        #[arg(long)]
        previous_log: Option<PathBuf>,
    },
    /// Discover new albums and import everything pending
    Import,
    /// Retry skipped albums without interaction
    RetrySkips,
    /// Import skipped albums interactively
    HandleSkips,
    /// Import skipped albums matching every term interactively
    HandleSkip {
        /// Case-insensitive substrings of the album directory name
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Retry failed albums one at a time
    HandleErrors,
    /// Show album counts per status
    Stats,
}

impl Cli {
    /// Layered configuration with command line flags on top
    pub fn load_config(&self) -> anyhow::Result<ShelfConfig> {
        let config = ShelfConfig::load(self.config.as_deref())?;
        self.apply_overrides(config)
    }

    pub fn apply_overrides(&self, mut config: ShelfConfig) -> anyhow::Result<ShelfConfig> {
        if let Some(dir) = &self.data_dir {
            config.data_dir.clone_from(dir);
        }
        if let Some(dir) = &self.albums_dir {
            config.albums_dir.clone_from(dir);
        }
        if let Some(tool) = &self.tool {
            config.tool.clone_from(tool);
        }
        if let Some(secs) = self.timeout_secs {
            config.import_timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 time {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("shelf").chain(args.iter().copied()))
    }

    #[test]
    fn test_setup_parses_cutoff() {
        let cli = parse(&[
            "setup",
            "--cutoff-time",
            "2024-03-01T12:00:00+01:00",
            "--previous-log",
            "/tmp/beet.log",
        ])
        .unwrap();

        match cli.command {
            Some(Command::Setup {
                cutoff_time,
                previous_log,
            }) => {
                assert_eq!(cutoff_time.to_rfc3339(), "2024-03-01T11:00:00+00:00");
                assert_eq!(previous_log, Some(PathBuf::from("/tmp/beet.log")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_setup_rejects_bad_cutoff() {
        assert!(parse(&["setup", "--cutoff-time", "yesterday"]).is_err());
        assert!(parse(&["setup"]).is_err());
    }

    #[test]
    fn test_handle_skip_needs_terms() {
        assert!(parse(&["handle-skip"]).is_err());

        let cli = parse(&["handle-skip", "boards", "geogaddi"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::HandleSkip {
                terms: vec!["boards".to_string(), "geogaddi".to_string()]
            })
        );
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        let err = parse(&["frobnicate"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_no_command_parses_to_none() {
        assert_eq!(parse(&[]).unwrap().command, None);
    }

    #[test]
    fn test_help_is_not_an_error_stream() {
        let err = parse(&["--help"]).unwrap_err();
        assert!(!err.use_stderr());
    }

    #[test]
    fn test_global_flags_override_config() {
        let cli = parse(&[
            "import",
            "--data-dir",
            "/srv/shelf",
            "--tool",
            "/opt/beet",
            "--timeout-secs",
            "60",
        ])
        .unwrap();

        let config = cli
            .apply_overrides(ShelfConfig::new("/data", "/albums"))
            .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/shelf"));
        assert_eq!(config.albums_dir, PathBuf::from("/albums"));
        assert_eq!(config.tool, "/opt/beet");
        assert_eq!(config.import_timeout_secs, 60);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let cli = parse(&["import", "--timeout-secs", "0"]).unwrap();
        assert!(cli
            .apply_overrides(ShelfConfig::new("/data", "/albums"))
            .is_err());
    }

    #[test]
    fn test_config_file_is_layered_under_flags() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "albums_dir = \"/srv/flac\"\ntool = \"beet-file\"\n").unwrap();

        let cli = parse(&[
            "stats",
            "--config",
            path.to_str().unwrap(),
            "--tool",
            "beet-flag",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();

        assert_eq!(config.albums_dir, PathBuf::from("/srv/flac"));
        assert_eq!(config.tool, "beet-flag");
    }
}
