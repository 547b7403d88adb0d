use std::path::PathBuf;
use std::time::Instant;

use accessilist_core::checklist::{find_type, known_types, DEFAULT_TYPE};
use accessilist_core::checklist_state::ChecklistState;
use accessilist_core::client::{ChecklistSession, StoreTransport};
use accessilist_core::config::{load_config, resolve_accessilist_home};
use accessilist_core::events::{Action, ActionTag};
use accessilist_core::report::{build_report, render_report_line};
use accessilist_core::session_key::{generate_session_key, share_query, validate_session_key};
use accessilist_core::store::{SessionStore, StoreError};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{json, Value};

mod version;

#[derive(Parser)]
#[command(
    name = "accessilist",
    version = version::FULL,
    about = "Accessibility checklist sessions"
)]
struct Cli {
    /// Data home (defaults to $ACCESSILIST_HOME, then ~/.accessilist)
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    /// Sessions directory (overrides config.toml)
    #[arg(long, global = true)]
    sessions_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information
    Version,
    /// List the checklist types
    Types {
        #[arg(long)]
        json: bool,
    },
    /// Pick an unused session key
    GenerateKey {
        #[arg(long)]
        json: bool,
    },
    /// Create a session unless it already exists
    Instantiate {
        key: String,
        #[arg(long = "type", default_value = DEFAULT_TYPE)]
        type_slug: String,
        #[arg(long)]
        json: bool,
    },
    /// Print a session's checklist
    Show {
        key: String,
        #[arg(long)]
        json: bool,
    },
    /// List sessions, newest first
    List {
        /// Include every status button
        #[arg(long)]
        detailed: bool,
        #[arg(long)]
        json: bool,
    },
    /// Delete a session
    Delete {
        key: String,
        #[arg(long)]
        json: bool,
    },
    /// Progress across all sessions
    Report {
        #[arg(long)]
        json: bool,
    },
    /// Print the share query for a session
    Share { key: String },
    /// Advance a task's status (ready, active, done)
    Status {
        key: String,
        row: String,
        #[arg(long)]
        json: bool,
    },
    /// Replace a task's notes
    Note {
        key: String,
        row: String,
        text: String,
        #[arg(long)]
        json: bool,
    },
    /// Rename a manually added task
    Task {
        key: String,
        row: String,
        text: String,
        #[arg(long)]
        json: bool,
    },
    /// Reset a task to ready and clear its notes
    Reset {
        key: String,
        row: String,
        #[arg(long)]
        json: bool,
    },
    /// Add a task to a checkpoint
    AddRow {
        key: String,
        checkpoint: u32,
        task: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete a manually added task
    DeleteRow {
        key: String,
        row: String,
        #[arg(long)]
        json: bool,
    },
}

fn open_store(cli: &Cli) -> Result<SessionStore> {
    let dir = match &cli.sessions_dir {
        Some(dir) => dir.clone(),
        None => {
            let home = match &cli.home {
                Some(home) => home.clone(),
                None => resolve_accessilist_home()?,
            };
            load_config(&home)
                .with_context(|| format!("loading config from {}", home.display()))?
                .unwrap_or_default()
                .sessions_dir(&home)
        }
    };
    SessionStore::open(&dir).with_context(|| format!("opening sessions dir {}", dir.display()))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_ms(ms: Option<i64>) -> String {
    ms.and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Applies actions to a stored session and saves the result.
fn edit(
    store: &SessionStore,
    key: &str,
    actions: &[Action],
) -> Result<ChecklistSession<StoreTransport>> {
    if !store.exists(key) {
        bail!("Session not found: {}", key);
    }
    let now = Instant::now();
    let (mut session, _) =
        ChecklistSession::open(key, DEFAULT_TYPE, StoreTransport::new(store.clone()), now)?;
    for action in actions {
        session.handle(action, now)?;
    }
    let records = session.save_now(now);
    if records.is_empty() || records.iter().any(|record| !record.succeeded) {
        let message = session
            .status_message(now)
            .map(|message| message.text.clone())
            .unwrap_or_else(|| "Save failed".to_string());
        return Err(anyhow!(message));
    }
    Ok(session)
}

fn report_row(session: &ChecklistSession<StoreTransport>, row: &str, json: bool) -> Result<()> {
    let task = session
        .checklist()
        .row(row)
        .ok_or_else(|| anyhow!("Unknown task row: {}", row))?;
    if json {
        return print_json(&json!({
            "ok": true,
            "sessionKey": session.key(),
            "row": task,
        }));
    }
    println!(
        "{} {} [{}] {}",
        session.key(),
        task.id,
        task.status.state.as_str(),
        task.task
    );
    Ok(())
}

fn show(checklist: &ChecklistState, key: &str) {
    println!("{} ({}) {}", key, checklist.type_slug, checklist.title);
    for section in &checklist.checkpoints {
        println!("{}  {}", section.section_id(), section.caption);
        for row in &section.rows {
            let marker = if row.manual { "+" } else { " " };
            println!(
                " {}[{:<6}] {:<5} {}",
                marker,
                row.status.state.as_str(),
                row.id,
                row.task
            );
            if !row.notes.is_empty() {
                println!("            notes: {}", row.notes);
            }
        }
    }
    let counts = checklist.summary();
    println!(
        "ready {} / active {} / done {}",
        counts.ready, counts.active, counts.done
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command.as_ref() else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Command::Version => {
            println!("accessilist {}", version::FULL);
        }
        Command::Types { json } => {
            if *json {
                let types: Vec<Value> = known_types()
                    .iter()
                    .map(|ty| {
                        json!({
                            "slug": ty.slug,
                            "displayName": ty.display_name,
                            "reservedKey": ty.reserved_key,
                        })
                    })
                    .collect();
                print_json(&json!({"ok": true, "types": types}))?;
            } else {
                for ty in known_types() {
                    println!("{:<11} {:<14} {}", ty.slug, ty.display_name, ty.reserved_key);
                }
            }
        }
        Command::GenerateKey { json } => {
            let store = open_store(&cli)?;
            let key = generate_session_key(&store)?;
            if *json {
                print_json(&json!({"ok": true, "sessionKey": key}))?;
            } else {
                println!("{}", key);
            }
        }
        Command::Instantiate {
            key,
            type_slug,
            json,
        } => {
            if !validate_session_key(key) {
                bail!("Invalid session key: {}", key);
            }
            if find_type(type_slug).is_none() {
                bail!("Unknown checklist type: {}", type_slug);
            }
            let store = open_store(&cli)?;
            let created = match store.create(key, type_slug) {
                Ok(_) => true,
                Err(StoreError::AlreadyExists(_)) => false,
                Err(err) => return Err(err.into()),
            };
            if *json {
                print_json(&json!({"ok": true, "sessionKey": key, "created": created}))?;
            } else if created {
                println!("Created {} ({})", key, type_slug);
            } else {
                println!("{} already exists", key);
            }
        }
        Command::Show { key, json } => {
            let store = open_store(&cli)?;
            let document = store.read(key)?;
            let mut checklist = ChecklistState::for_type(&document.type_slug)?;
            let report = checklist.restore(&document.state);
            if *json {
                print_json(&json!({
                    "ok": true,
                    "sessionKey": document.session_key,
                    "metadata": document.metadata,
                    "checklist": checklist,
                    "unknownWidgets": report.unknown_widgets,
                }))?;
            } else {
                show(&checklist, key);
            }
        }
        Command::List { detailed, json } => {
            let store = open_store(&cli)?;
            if *detailed {
                let sessions = store.list_detailed()?;
                if *json {
                    print_json(&json!({"ok": true, "sessions": sessions}))?;
                } else {
                    for detail in &sessions {
                        let report = build_report(std::slice::from_ref(detail));
                        for line in report.sessions.iter().map(render_report_line) {
                            println!("{}", line);
                        }
                    }
                }
            } else {
                let sessions = store.list()?;
                if *json {
                    print_json(&json!({"ok": true, "sessions": sessions}))?;
                } else if sessions.is_empty() {
                    println!("No sessions");
                } else {
                    for session in &sessions {
                        println!(
                            "{:<20} {:<11} created {}  modified {}",
                            session.session_key,
                            session.type_slug,
                            format_ms(Some(session.created)),
                            format_ms(session.last_modified)
                        );
                    }
                }
            }
        }
        Command::Delete { key, json } => {
            let store = open_store(&cli)?;
            store.delete(key)?;
            if *json {
                print_json(&json!({"ok": true, "sessionKey": key}))?;
            } else {
                println!("Deleted {}", key);
            }
        }
        Command::Report { json } => {
            let store = open_store(&cli)?;
            let report = build_report(&store.list_detailed()?);
            if *json {
                print_json(&json!({"ok": true, "report": report}))?;
            } else {
                for session in &report.sessions {
                    println!("{}", render_report_line(session));
                }
                for (type_slug, totals) in &report.by_type {
                    println!(
                        "{}: {} sessions, {} completed",
                        type_slug, totals.sessions, totals.completed_sessions
                    );
                }
            }
        }
        Command::Share { key } => {
            println!("{}", share_query(key));
        }
        Command::Status { key, row, json } => {
            let store = open_store(&cli)?;
            let session = edit(&store, key, &[Action::new(ActionTag::Status, row)])?;
            report_row(&session, row, *json)?;
        }
        Command::Note {
            key,
            row,
            text,
            json,
        } => {
            let store = open_store(&cli)?;
            let session = edit(
                &store,
                key,
                &[Action::new(ActionTag::Notes, row).with_value(text)],
            )?;
            report_row(&session, row, *json)?;
        }
        Command::Task {
            key,
            row,
            text,
            json,
        } => {
            let store = open_store(&cli)?;
            let session = edit(
                &store,
                key,
                &[Action::new(ActionTag::Task, row).with_value(text)],
            )?;
            report_row(&session, row, *json)?;
        }
        Command::Reset { key, row, json } => {
            let store = open_store(&cli)?;
            let session = edit(
                &store,
                key,
                &[
                    Action::new(ActionTag::Reset, row),
                    Action::new(ActionTag::Confirm, row),
                ],
            )?;
            report_row(&session, row, *json)?;
        }
        Command::AddRow {
            key,
            checkpoint,
            task,
            json,
        } => {
            let store = open_store(&cli)?;
            let session = edit(
                &store,
                key,
                &[Action::new(ActionTag::AddRow, checkpoint.to_string()).with_value(task)],
            )?;
            let row = session
                .checklist()
                .checkpoint(*checkpoint)
                .and_then(|section| section.rows.last())
                .map(|row| row.id.clone())
                .ok_or_else(|| anyhow!("Checkpoint {} has no rows", checkpoint))?;
            report_row(&session, &row, *json)?;
        }
        Command::DeleteRow { key, row, json } => {
            let store = open_store(&cli)?;
            edit(
                &store,
                key,
                &[
                    Action::new(ActionTag::DeleteRow, row),
                    Action::new(ActionTag::Confirm, row),
                ],
            )?;
            if *json {
                print_json(&json!({"ok": true, "sessionKey": key, "deleted": row}))?;
            } else {
                println!("Deleted task {} from {}", row, key);
            }
        }
    }
    Ok(())
}
