use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::capsule::Capsule;
use crate::ingest::IngestReport;
use crate::phase::Phase;
use crate::session::Session;
use crate::ui::icons::{CHECK, CROSS, FILE_NEW, LOOP, PAUSE, RUNNING, SPARKLE, WARN};

const TICK: Duration = Duration::from_millis(100);

/// Operator-facing output for a session run.
///
/// Diagnostics go through `tracing`; this is the narrative the operator reads.
#[derive(Debug, Clone, Default)]
pub struct SessionUI {
    verbose: bool,
}

impl SessionUI {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn session_banner(&self, session: &Session) {
        println!();
        println!(
            "{} {} {}",
            SPARKLE,
            style(&session.id).bold(),
            style(format!("({}, {})", session.mode, session.status)).dim()
        );
        println!("   {}", session.description);
        if self.verbose {
            println!("   {} {}", style("repos:").dim(), session.repos.join(", "));
        }
    }

    pub fn phase_start(&self, phase: Phase, attempt: Option<u32>) {
        match attempt {
            Some(n) => println!(
                "\n{}{} {}",
                RUNNING,
                style(phase).cyan().bold(),
                style(format!("(attempt {})", n)).dim()
            ),
            None => println!("\n{}{}", RUNNING, style(phase).cyan().bold()),
        }
    }

    pub fn phase_done(&self, phase: Phase, report: Option<&IngestReport>) {
        match report {
            Some(r) => {
                println!(
                    "  {}{} {}",
                    CHECK,
                    style(format!("{} complete", phase)).green(),
                    style(r.stored_at.display()).dim()
                );
                if let Some(v) = &r.version_path
                    && self.verbose
                {
                    println!("  {}{}", FILE_NEW, style(v.display()).dim());
                }
                if r.capsules_extracted > 0 {
                    println!(
                        "  {} decision(s) captured, {} new",
                        r.capsules_extracted, r.capsules_added
                    );
                }
                if let Some(w) = &r.validation_warning {
                    self.warn(w);
                }
            }
            None => println!("  {}{}", CHECK, style(format!("{} complete", phase)).green()),
        }
    }

    pub fn warn(&self, msg: &str) {
        println!("  {}{}", WARN, style(msg).yellow());
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{}{}", CROSS, style(msg).red());
    }

    pub fn reexecuting(&self, attempt: u32) {
        println!(
            "  {}{}",
            LOOP,
            style(format!("attempt {} failed verification; re-executing", attempt)).yellow()
        );
    }

    /// Tell the operator the session is paused and how to pick it up again.
    pub fn paused(&self, session_id: &str, reason: &str, resume_from: Option<Phase>) {
        println!();
        println!("{}{} {}", PAUSE, style("Session paused:").yellow().bold(), reason);
        let command = match resume_from {
            Some(phase) => format!("cairn resume {} --from {}", session_id, phase),
            None => format!("cairn resume {}", session_id),
        };
        println!("   Resume with: {}", style(command).cyan());
    }

    pub fn completed(&self, session: &Session, purged: usize) {
        println!();
        println!(
            "{}{} {}",
            CHECK,
            style("Session completed:").green().bold(),
            session.id
        );
        if self.verbose {
            println!("   {} transient artifact(s) removed", purged);
        }
    }

    pub fn session_row(&self, session: &Session) {
        let status = match session.status {
            s if s.is_terminal() => style(s.to_string()).dim(),
            crate::session::SessionStatus::Paused => style(session.status.to_string()).yellow(),
            s => style(s.to_string()).cyan(),
        };
        println!(
            "{:<50} {:<14} {:<9} {}",
            session.id,
            status,
            session.mode,
            session.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    pub fn capsule_row(&self, capsule: &Capsule) {
        println!(
            "{} {:<12} {:<10} {}",
            style(&capsule.id).dim(),
            capsule.phase,
            capsule.status,
            capsule.question
        );
        if !capsule.choice.is_empty() {
            println!("   {} {}", style("→").dim(), capsule.choice);
        }
    }
}

/// Spinner shown while the agent works on its own.
///
/// The spinner runs on its own task and only receives a stop signal; call
/// [`ActivityIndicator::finish`] to stop and join it before moving on.
pub struct ActivityIndicator {
    bar: ProgressBar,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ActivityIndicator {
    pub fn start(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        let spinner_style = ProgressStyle::default_spinner()
            .template("  {spinner} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_message(message.into());
        Self::spawn(bar)
    }

    /// Indicator that draws nothing.
    pub fn hidden() -> Self {
        Self::spawn(ProgressBar::hidden())
    }

    fn spawn(bar: ProgressBar) -> Self {
        let (tx, mut rx) = oneshot::channel::<()>();
        let ticker = bar.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = interval.tick() => ticker.tick(),
                }
            }
        });
        Self {
            bar,
            stop: Some(tx),
            handle: Some(handle),
        }
    }

    pub async fn finish(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            tracing::debug!(error = %e, "activity indicator task ended abnormally");
        }
        self.bar.finish_and_clear();
    }
}

impl Drop for ActivityIndicator {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}
