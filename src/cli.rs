//! CLI argument parsing for git-tkt.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "git-tkt",
    about = "Distributed tickets stored on a git branch",
    version,
    after_help = "Logs are written to: ~/.local/share/git-tkt/logs/git-tkt.log"
)]
pub struct Cli {
    /// Path inside the git repository (default: current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    /// Branch holding the tickets
    #[arg(short, long, global = true)]
    pub branch: Option<String>,

    /// YAML file describing the ticket fields
    #[arg(long, global = true)]
    pub fields_file: Option<PathBuf>,

    /// Remember --branch, --fields-file and --folder for this repository
    #[arg(long, global = true)]
    pub save: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new ticket
    New {
        /// Field values, e.g. --set name="Crash on startup"
        #[arg(short, long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, String)>,

        /// Folder to create the ticket in
        #[arg(short, long)]
        folder: Option<String>,
    },

    /// Show one ticket
    Show {
        /// Ticket number or global ID
        key: String,

        #[arg(short, long)]
        folder: Option<String>,
    },

    /// Change fields of a ticket
    Edit {
        /// Ticket number or global ID
        key: String,

        /// New field values
        #[arg(short, long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment, required = true)]
        set: Vec<(String, String)>,

        #[arg(short, long)]
        folder: Option<String>,
    },

    /// List tickets in a folder
    List {
        #[arg(short, long)]
        folder: Option<String>,
    },

    /// List ticket folders
    Folders,

    /// Describe the ticket fields
    Fields,

    /// Merge tickets from a remote
    Pull {
        /// Remote name, URL or path
        #[arg(default_value = "origin")]
        remote: String,

        /// Remote branch (default: the ticket branch)
        remote_branch: Option<String>,

        /// Keep the remote's numbers and renumber local new tickets
        #[arg(long)]
        keep_remote: bool,

        /// Abort if a ticket was edited on both sides
        #[arg(long)]
        strict: bool,
    },
}

impl Command {
    /// The folder named on the command line, if any.
    pub fn folder(&self) -> Option<&str> {
        match self {
            Command::New { folder, .. }
            | Command::Show { folder, .. }
            | Command::Edit { folder, .. }
            | Command::List { folder } => folder.as_deref(),
            Command::Folders | Command::Fields | Command::Pull { .. } => None,
        }
    }
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
        _ => Err(format!("expected FIELD=VALUE, got '{}'", raw)),
    }
}
