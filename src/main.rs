//! git-tkt CLI - distributed tickets stored on a git branch.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use gittkt::{Config, FieldMap, FieldSchema, GitTree, Listing, PullOptions, Store, Ticket};
use log::info;
use std::fs;
use std::path::PathBuf;

mod cli;

use cli::{Cli, Command};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("git-tkt")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("git-tkt.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_repo_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn fit(value: &str, width: usize) -> String {
    let single_line = value.replace('\n', " ");
    if single_line.chars().count() <= width {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn print_table(schema: &FieldSchema, tickets: &[Ticket]) {
    let columns: Vec<_> = schema.list_columns().collect();

    let mut header = format!("{:>4} |", "#");
    for (spec, width) in &columns {
        header.push_str(&format!(" {:^width$} |", fit(spec.label(), *width), width = *width));
    }
    println!("{}", header.bold());
    println!("{}", "-".repeat(header.chars().count()).dimmed());

    for ticket in tickets {
        let mut row = format!("{} |", format!("{:>4}", ticket.num).cyan());
        for (spec, width) in &columns {
            let value = ticket.fields.get(&spec.name).unwrap_or_default();
            row.push_str(&format!(" {:<width$} |", fit(value, *width), width = *width));
        }
        println!("{}", row);
    }
}

fn print_ticket(schema: &FieldSchema, ticket: &Ticket) {
    println!("{}: {}", "Number".bold(), format!("#{}", ticket.num).cyan());
    println!("{}: {}", "ID".bold(), ticket.id);
    println!("{}: {}", "Created".bold(), ticket.creation_date);
    for (name, value) in ticket.fields.iter() {
        let label = schema.field(name).map_or(name, |spec| spec.label());
        println!("{}: {}", label.bold(), value);
    }
}

fn run(cli: Cli) -> Result<()> {
    let repo_dir = get_repo_dir(&cli);
    let tree = GitTree::open(&repo_dir).context("Failed to open git repository")?;
    let git_dir = tree.git_dir().to_path_buf();

    let mut config = Config::load(&git_dir).context("Failed to load config")?;
    if let Some(branch) = &cli.branch {
        config.branch = branch.clone();
    }
    if let Some(fields_file) = &cli.fields_file {
        config.fields_file = Some(fields_file.clone());
    }
    if let Some(folder) = cli.command.folder() {
        config.default_folder = folder.to_string();
    }
    if cli.save {
        let path = config.save(&git_dir).context("Failed to save config")?;
        println!("{} Saved settings to {}", "✓".green(), path.display());
    }

    let schema = match &config.fields_file {
        Some(path) => FieldSchema::load(path).with_context(|| format!("Failed to load fields from {}", path.display()))?,
        None => FieldSchema::default(),
    };
    let folder = config.default_folder.clone();
    let mut store = Store::new(tree, config.branch.clone()).with_schema(schema);

    match cli.command {
        Command::New { set, .. } => {
            let fields: FieldMap = set.into_iter().collect();
            let ticket = store.add(&folder, &fields).context("Failed to create ticket")?;
            println!(
                "{} Created: {} {} {}",
                "✓".green(),
                format!("#{}", ticket.num).cyan(),
                ticket.fields.get("name").unwrap_or_default(),
                ticket.id.to_string().dimmed()
            );
        }

        Command::Show { key, .. } => {
            let ticket = store.get(&folder, &key).context("Failed to get ticket")?;
            print_ticket(store.schema(), &ticket);
        }

        Command::Edit { key, set, .. } => {
            let updates: FieldMap = set.into_iter().collect();
            let ticket = store.edit(&folder, &key, &updates).context("Failed to edit ticket")?;
            println!("{} Updated: {}", "✓".green(), format!("#{}", ticket.num).cyan());
        }

        Command::List { .. } => match store.list(&folder).context("Failed to list tickets")? {
            Listing::Empty => println!("{}", format!("No tickets in {}", folder).dimmed()),
            Listing::Tickets(tickets) => print_table(store.schema(), &tickets),
        },

        Command::Folders => {
            let folders = store.folders().context("Failed to list folders")?;
            if folders.is_empty() {
                println!("{}", "No folders found".dimmed());
            }
            for name in folders {
                if name == folder {
                    println!("{} {}", "*".green(), name.green());
                } else {
                    println!("  {}", name);
                }
            }
        }

        Command::Fields => {
            for spec in &store.schema().fields {
                println!("{}", spec);
            }
        }

        Command::Pull {
            remote,
            remote_branch,
            keep_remote,
            strict,
        } => {
            let remote_branch = remote_branch.unwrap_or_else(|| store.branch().to_string());
            let options = PullOptions {
                keep_local: !keep_remote,
                strict,
            };
            let report = store
                .pull(&remote, &remote_branch, options)
                .with_context(|| format!("Failed to pull from {}/{}", remote, remote_branch))?;

            if report.is_up_to_date() {
                println!("{}", "Already up to date".dimmed());
                return Ok(());
            }
            for (name, outcome) in &report.folders {
                if outcome.notes.is_empty() {
                    continue;
                }
                println!("{}", name.bold());
                for note in &outcome.notes {
                    println!("  {}", note);
                }
            }
            for conflict in &report.conflicts {
                println!("{} Kept local version of {}", "!".yellow(), conflict);
            }
            println!(
                "{} Merged {}/{} ({} record(s) updated)",
                "✓".green(),
                remote,
                remote_branch,
                report.copied.len()
            );
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
