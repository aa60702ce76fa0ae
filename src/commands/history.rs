use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::{NebenchatError, Result};
use crate::session::{ChatSession, SessionStore};
use colored::Colorize;
use prettytable::{format, Table};

/// Handle history commands
pub fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let store = super::open_session_store(config)?;
    run_history(&store, command)
}

/// Run a history command against an already opened store
pub fn run_history(store: &SessionStore, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List { user } => {
            let sessions = store.sessions(&user)?;

            if sessions.is_empty() {
                println!("{}", format!("No chat history found for {}.", user).yellow());
                return Ok(());
            }

            println!("\nChat sessions for {}:", user);
            session_table(&sessions).printstd();
            println!();
            println!(
                "Use {} to make a session current again.",
                "nebenchat history revert --user <USER> --session <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { user, session } => {
            let sessions = store.sessions(&user)?;
            let selected = match session {
                Some(prefix) => {
                    let id = resolve_session_id(&sessions, &prefix)?;
                    sessions.into_iter().find(|s| s.session_id == id)
                }
                None => sessions.into_iter().last(),
            };

            match selected {
                Some(session) => print_session(&session),
                None => println!("{}", format!("No chat history found for {}.", user).yellow()),
            }
        }
        HistoryCommand::Revert { user, session } => {
            let sessions = store.sessions(&user)?;
            let id = resolve_session_id(&sessions, &session)?;
            let reverted = store.revert(&user, &id)?;
            println!(
                "{}",
                format!("Session {} is now current for {}", reverted.session_id, user).green()
            );
        }
        HistoryCommand::Clear { user } => {
            store.clear(&user)?;
            println!("{}", format!("Cleared chat history for {}", user).green());
        }
    }

    Ok(())
}

/// Table of sessions, marking the current one
pub fn session_table(sessions: &[ChatSession]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Summary".bold(),
        "Turns".bold(),
        "Created".bold(),
        "Last Updated".bold()
    ]);

    let current = sessions.last().map(|s| s.session_id.as_str());
    for session in sessions {
        let id_short: String = session.session_id.chars().take(8).collect();
        let id_cell = if Some(session.session_id.as_str()) == current {
            format!("{} *", id_short).green()
        } else {
            id_short.cyan()
        };
        let summary = if session.summary.chars().count() > 40 {
            format!("{}...", session.summary.chars().take(37).collect::<String>())
        } else {
            session.summary.clone()
        };

        table.add_row(prettytable::row![
            id_cell,
            summary,
            session.exchanges.len(),
            session.created_at.format("%Y-%m-%d %H:%M"),
            session.updated_at.format("%Y-%m-%d %H:%M")
        ]);
    }

    table
}

/// Expand a session id prefix to the full id
///
/// # Errors
///
/// Returns `SessionNotFound` if no session matches and a usage error if the
/// prefix is ambiguous
pub fn resolve_session_id(sessions: &[ChatSession], prefix: &str) -> Result<String> {
    if let Some(exact) = sessions.iter().find(|s| s.session_id == prefix) {
        return Ok(exact.session_id.clone());
    }

    let matches: Vec<&ChatSession> = sessions
        .iter()
        .filter(|s| s.session_id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [only] => Ok(only.session_id.clone()),
        [] => Err(NebenchatError::SessionNotFound(prefix.to_string()).into()),
        _ => Err(anyhow::anyhow!(
            "Session prefix '{}' matches {} sessions",
            prefix,
            matches.len()
        )),
    }
}

fn print_session(session: &ChatSession) {
    println!();
    println!("{} {}", "Session".bold(), session.session_id.cyan());
    if !session.summary.is_empty() {
        println!("{}", session.summary.dimmed());
    }
    if let Some(store) = &session.vector_store_id {
        println!("Vector store: {}", store);
    }
    println!();

    for turn in &session.exchanges {
        println!(
            "{} {}",
            turn.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            turn.model.dimmed()
        );
        println!("{} {}", "You:".bold(), turn.user_message);
        if let Some(file_name) = turn.file_name.as_deref().filter(|_| turn.has_file) {
            println!("     {} {}", "attached".yellow(), file_name);
        }
        println!("{} {}", "AI:".bold().green(), turn.ai_response);
        if let Some(path) = &turn.generated_file {
            println!("     {} {}", "file".yellow(), path);
        }
        if let Some(url) = &turn.image_url {
            println!("     {} {}", "image".yellow(), url);
        }
        println!();
    }
}
