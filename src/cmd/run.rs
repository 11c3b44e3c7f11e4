//! Session execution: `cairn run` and `cairn resume`.

use anyhow::Result;
use std::sync::Arc;

use cairn::config::Config;
use cairn::gates::DialoguerPrompt;
use cairn::orchestrator::{ClaudeAgent, InterruptFlag, Orchestrator, RunOutcome};
use cairn::phase::Phase;

fn build_orchestrator(config: &Config, interrupt: InterruptFlag) -> Orchestrator {
    let agent = Arc::new(ClaudeAgent::new(config, interrupt.clone()));
    let operator = Arc::new(DialoguerPrompt::new());
    Orchestrator::new(config.clone(), agent, operator, interrupt)
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed => tracing::debug!("run completed"),
        RunOutcome::Paused { reason, .. } => tracing::debug!(%reason, "run paused"),
    }
}

pub async fn cmd_run(config: &Config, id: &str) -> Result<()> {
    let interrupt = InterruptFlag::new();
    let listener = interrupt.listen_for_ctrl_c();
    let orchestrator = build_orchestrator(config, interrupt);

    let result = orchestrator.run(id).await;
    listener.abort();
    report(&result?);
    Ok(())
}

pub async fn cmd_resume(config: &Config, id: &str, from: Option<&str>) -> Result<()> {
    let from = from.map(str::parse::<Phase>).transpose()?;

    let interrupt = InterruptFlag::new();
    let listener = interrupt.listen_for_ctrl_c();
    let orchestrator = build_orchestrator(config, interrupt);

    let result = orchestrator.resume(id, from).await;
    listener.abort();
    report(&result?);
    Ok(())
}
