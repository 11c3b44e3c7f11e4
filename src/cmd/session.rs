//! Session lifecycle commands: `new`, `status`, `pause`, `abandon`.

use anyhow::{Context, Result};
use console::style;

use cairn::config::Config;
use cairn::errors::SessionError;
use cairn::ingest::Stores;
use cairn::phase::Phase;
use cairn::session::{NewSession, Session, SessionLock, SessionMode};
use cairn::ui::SessionUI;
use cairn::ui::icons::{CHECK, WARN};

pub struct NewArgs<'a> {
    pub description: &'a str,
    pub repos: &'a [String],
    pub mode: &'a str,
    pub context: Option<&'a str>,
    pub author: Option<&'a str>,
    pub supersedes: &'a [String],
    pub extends: &'a [String],
}

pub fn cmd_new(config: &Config, args: NewArgs<'_>) -> Result<()> {
    let mode: SessionMode = args.mode.parse()?;
    let stores = Stores::new(&config.sessions_dir);

    for repo in args.repos {
        let path = config.resolve_repo(repo);
        if !path.is_dir() {
            println!(
                "{}{}",
                WARN,
                style(format!("Repository {} not found at {}", repo, path.display())).yellow()
            );
        }
    }

    let session = stores
        .sessions
        .create(NewSession {
            description: args.description.to_string(),
            context: args.context.unwrap_or_default().to_string(),
            mode,
            repos: args.repos.to_vec(),
            author: args.author.map(str::to_string),
            supersedes: args.supersedes.to_vec(),
            extends: args.extends.to_vec(),
        })
        .context("Failed to create session")?;

    println!("{}Created session {}", CHECK, style(&session.id).bold());
    println!("   Start it with: {}", style(format!("cairn run {}", session.id)).cyan());
    Ok(())
}

pub fn cmd_status(config: &Config, id: Option<&str>) -> Result<()> {
    let stores = Stores::new(&config.sessions_dir);
    let ui = SessionUI::new(config.verbose);

    let Some(id) = id else {
        let sessions = stores.sessions.list();
        if sessions.is_empty() {
            println!("No sessions yet. Create one with 'cairn new <description> --repo <repo>'.");
            return Ok(());
        }
        println!(
            "{:<50} {:<14} {:<9} Created",
            "Session", "Status", "Mode"
        );
        for session in &sessions {
            ui.session_row(session);
        }
        return Ok(());
    };

    let session = stores.sessions.load(id)?;
    print_session(&stores, &session)
}

fn print_session(stores: &Stores, session: &Session) -> Result<()> {
    println!();
    println!("{}", style(&session.id).bold());
    println!("  Description: {}", session.description);
    println!("  Mode:        {}", session.mode);
    match session.previous_status {
        Some(previous) if session.is_paused() => {
            println!("  Status:      {} (was {})", style(session.status).yellow(), previous)
        }
        _ => println!("  Status:      {}", session.status),
    }
    println!("  Repos:       {}", session.repos.join(", "));
    println!("  Created:     {}", session.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated:     {}", session.updated_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(author) = &session.author {
        println!("  Author:      {}", author);
    }
    if !session.context.is_empty() {
        println!("  Context:     {}", session.context);
    }

    if !session.execution_attempts.is_empty() {
        println!();
        println!("  Execution attempts:");
        for attempt in &session.execution_attempts {
            let reason = attempt
                .reason
                .as_deref()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default();
            println!(
                "    #{} {} {}{}",
                attempt.attempt,
                attempt.started_at.format("%Y-%m-%d %H:%M"),
                attempt.outcome,
                reason
            );
        }
    }

    let artifacts: Vec<Phase> = Phase::ALL
        .into_iter()
        .filter(|p| {
            stores
                .artifacts
                .session_artifact_path(&session.id, p.name())
                .exists()
        })
        .collect();
    if !artifacts.is_empty() {
        println!();
        println!(
            "  Artifacts:   {}",
            artifacts
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let capsules = stores.capsules.load_session(&session.id)?;
    if !capsules.is_empty() {
        println!("  Capsules:    {}", capsules.len());
    }
    println!();
    Ok(())
}

/// Lock the session for a one-off edit; a running orchestrator holds the lock.
fn lock_for_edit(stores: &Stores, id: &str) -> Result<SessionLock> {
    if !stores.sessions.exists(id) {
        return Err(SessionError::NotFound { id: id.to_string() }.into());
    }
    SessionLock::acquire(&stores.sessions.session_dir(id), id).map_err(|e| match e {
        SessionError::Locked { .. } => anyhow::anyhow!(
            "Session {} is running in another cairn process; press Ctrl-C there to pause it",
            id
        ),
        other => other.into(),
    })
}

pub fn cmd_pause(config: &Config, id: &str) -> Result<()> {
    let stores = Stores::new(&config.sessions_dir);
    let _lock = lock_for_edit(&stores, id)?;

    let mut session = stores.sessions.load(id)?;
    session.pause()?;
    stores.sessions.save(&session)?;
    SessionUI::new(config.verbose).paused(&session.id, "paused by operator", None);
    Ok(())
}

pub fn cmd_abandon(config: &Config, id: &str) -> Result<()> {
    let stores = Stores::new(&config.sessions_dir);
    let _lock = lock_for_edit(&stores, id)?;

    let mut session = stores.sessions.load(id)?;
    session.abandon()?;
    stores.sessions.save(&session)?;
    tracing::info!(session = %session.id, "session abandoned");
    println!("Session {} abandoned", session.id);
    Ok(())
}
