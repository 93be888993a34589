//! CLI interface for Triptych
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Triptych
///
/// Writes a document with three draft generators in different styles, a
/// critic that sends drafts back for revision or asks you questions, and an
/// editor that merges the approved drafts.
#[derive(Parser, Debug)]
#[command(name = "triptych")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a new run
    Run {
        /// What the document should be about
        topic: String,

        /// Attach the text of a file as reference material
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },

    /// Answer the questions of a suspended run and continue it
    Answer {
        /// Run ID printed when the run was suspended
        run_id: String,

        /// Your answer
        response: String,
    },

    /// Show recent runs
    History {
        /// Number of runs to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show all messages of a run
    Replay {
        /// Run ID to replay
        run_id: String,
    },

    /// Run system diagnostics
    Doctor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_with_file() {
        let cli = Cli::parse_from(["triptych", "run", "Rust ownership", "--file", "notes.md"]);
        match cli.command {
            Command::Run { topic, file } => {
                assert_eq!(topic, "Rust ownership");
                assert_eq!(file, Some(PathBuf::from("notes.md")));
            }
            other => panic!("Expected Run, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["triptych", "answer", "abc", "beginners", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Answer { .. }));
    }

    #[test]
    fn test_history_default_limit() {
        let cli = Cli::parse_from(["triptych", "history"]);
        assert!(matches!(cli.command, Command::History { limit: 10 }));
    }
}
