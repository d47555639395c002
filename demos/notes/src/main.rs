//! notes
//!
//! Keeps notes in any store omnidm can open.
//!
//! # Commands
//!
//! - `add` - Store a new note
//! - `list` - List notes, optionally only open ones
//! - `show` - Print one note
//! - `done` - Mark a note as done
//! - `tag` - Add a tag to a note
//! - `remove` - Delete a note
//! - `purge` - Delete every finished note

mod note;

use clap::{Parser, Subcommand};
use note::{Note, NoteView};
use omnidm_codec::Timestamp;
use omnidm_core::query::{eq, Query, Update};
use omnidm_core::{BackendConfig, ConnectionRegistry, Session};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Notes persisted through omnidm.
#[derive(Parser)]
#[command(name = "notes")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Connection URI, e.g. `sqlite://notes.db` or `memory://`
    #[arg(global = true, short, long, default_value = "sqlite://notes.db")]
    uri: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new note
    Add {
        /// Note title
        title: String,

        /// Longer text
        #[arg(short, long)]
        body: Option<String>,

        /// Tags (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// List notes
    List {
        /// Only notes not yet done
        #[arg(short, long)]
        open: bool,

        /// Only notes carrying this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Maximum number of notes
        #[arg(short, long)]
        limit: Option<u64>,
    },

    /// Print one note
    Show {
        /// Note id
        id: i64,
    },

    /// Mark a note as done
    Done {
        /// Note id
        id: i64,
    },

    /// Add a tag to a note
    Tag {
        /// Note id
        id: i64,

        /// Tag to add
        tag: String,
    },

    /// Delete a note
    Remove {
        /// Note id
        id: i64,
    },

    /// Delete every finished note
    Purge,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn print(notes: &[Note], format: &str) -> CliResult<()> {
    if format == "json" {
        let views: Vec<NoteView<'_>> = notes.iter().map(NoteView::from).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        for note in notes {
            println!("{note}");
        }
    }
    Ok(())
}

fn next_id(notes: &Session<Note>) -> CliResult<i64> {
    let last = notes.find_one(Query::all().sort_desc("id"))?;
    Ok(last.map_or(1, |n| n.id + 1))
}

fn run(cli: Cli) -> CliResult<()> {
    let config = BackendConfig::from_uri(&cli.uri)?;
    info!(backend = %config, "opening store");
    let registry = ConnectionRegistry::new();
    registry.open("notes", config)?;
    let notes = registry.session::<Note>("notes")?;

    match cli.command {
        Commands::Add { title, body, tags } => {
            let note = notes.save(Note {
                id: next_id(&notes)?,
                title,
                body,
                tags,
                created: Timestamp::now(),
                done: false,
            })?;
            println!("added note {}", note.id);
        }
        Commands::List { open, tag, limit } => {
            let mut query = if open {
                Query::matching(eq("done", false))
            } else {
                Query::all()
            };
            query = query.sort_asc("id");
            let mut listed = Vec::new();
            for note in notes.find(query)? {
                let note = note?;
                if tag.as_ref().is_some_and(|t| !note.tags.contains(t)) {
                    continue;
                }
                listed.push(note);
                if limit.is_some_and(|l| listed.len() as u64 >= l) {
                    break;
                }
            }
            print(&listed, &cli.format)?;
        }
        Commands::Show { id } => {
            let note = notes.find_by_id(id)?.ok_or_else(|| format!("no note {id}"))?;
            if cli.format == "json" {
                print(std::slice::from_ref(&note), &cli.format)?;
            } else {
                println!("{note}");
                if let Some(body) = &note.body {
                    println!("\n{body}");
                }
                if let Some(created) = note.created.to_rfc3339() {
                    println!("\ncreated {created}");
                }
            }
        }
        Commands::Done { id } => {
            if !notes.update_by_id(id, &Update::new().set("done", true))? {
                return Err(format!("no note {id}").into());
            }
            println!("closed note {id}");
        }
        Commands::Tag { id, tag } => {
            if !notes.update_by_id(id, &Update::new().push("tags", tag.as_str()))? {
                return Err(format!("no note {id}").into());
            }
            println!("tagged note {id} with {tag}");
        }
        Commands::Remove { id } => {
            if !notes.delete_by_id(id)? {
                return Err(format!("no note {id}").into());
            }
            println!("removed note {id}");
        }
        Commands::Purge => {
            let removed = notes.delete(eq("done", true))?;
            println!("purged {removed} notes");
        }
    }

    registry.shutdown();
    Ok(())
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run(cli)
}
