//! External coding-agent port.
//!
//! The orchestrator hands the agent a request and gets back one of three
//! outcomes. [`ClaudeAgent`] runs the configured CLI as a subprocess; tests
//! substitute their own [`AgentRunner`].

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::interrupt::InterruptFlag;
use super::phases::ExecutionMode;
use crate::config::Config;
use crate::errors::OrchestratorError;
use crate::phase::Phase;

/// Exit code shells report for a process ended by SIGINT.
const SIGINT_EXIT_CODE: i32 = 130;
/// Trailing stderr kept in failure messages.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub phase: Phase,
    pub system_prompt: String,
    pub message: String,
    /// Where the agent runs (primary repository root)
    pub working_dir: PathBuf,
    /// Where the agent is asked to write its artifact
    pub output_dir: PathBuf,
    /// `None` leaves the agent unrestricted
    pub allowed_tools: Option<Vec<String>>,
    pub mode: ExecutionMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Success,
    /// The operator stopped the agent; not an error
    Interrupted,
    Failed(String),
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, request: &AgentRequest) -> Result<AgentOutcome, OrchestratorError>;
}

/// Runs the agent CLI (`claude` by default).
pub struct ClaudeAgent {
    command: String,
    flags: Vec<String>,
    interrupt: InterruptFlag,
}

impl ClaudeAgent {
    pub fn new(config: &Config, interrupt: InterruptFlag) -> Self {
        Self {
            command: config.agent_cmd.clone(),
            flags: config.agent_flags(),
            interrupt,
        }
    }

    fn build_command(&self, request: &AgentRequest) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.flags);
        cmd.arg("--append-system-prompt").arg(&request.system_prompt);
        cmd.arg("--add-dir").arg(&request.output_dir);
        if let Some(tools) = &request.allowed_tools {
            cmd.arg("--allowedTools").arg(tools.join(","));
        }
        if request.mode == ExecutionMode::NonInteractive {
            cmd.arg("--print");
        }
        cmd.current_dir(&request.working_dir);
        cmd
    }

    fn classify(&self, status: ExitStatus, stderr: &str) -> AgentOutcome {
        if status.success() {
            return AgentOutcome::Success;
        }
        if self.interrupt.is_raised() || was_interrupted(status) {
            return AgentOutcome::Interrupted;
        }
        let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        AgentOutcome::Failed(format!("exit {}: {}", code, tail.join("\n").trim()))
    }
}

#[async_trait]
impl AgentRunner for ClaudeAgent {
    async fn run(&self, request: &AgentRequest) -> Result<AgentOutcome, OrchestratorError> {
        let mut cmd = self.build_command(request);
        let spawn_err = |source: std::io::Error| OrchestratorError::AgentSpawn {
            command: self.command.clone(),
            source,
        };
        tracing::debug!(phase = %request.phase, command = %self.command, mode = ?request.mode, "spawning agent");

        match request.mode {
            ExecutionMode::Interactive => {
                // The operator talks to the agent directly in this terminal.
                cmd.arg(&request.message);
                let status = cmd
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .status()
                    .await
                    .map_err(spawn_err)?;
                Ok(self.classify(status, ""))
            }
            ExecutionMode::NonInteractive => {
                let mut child = cmd
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(spawn_err)?;

                if let Some(mut stdin) = child.stdin.take() {
                    stdin
                        .write_all(request.message.as_bytes())
                        .await
                        .map_err(spawn_err)?;
                    stdin.shutdown().await.map_err(spawn_err)?;
                }

                let output = child.wait_with_output().await.map_err(spawn_err)?;
                let stdout = String::from_utf8_lossy(&output.stdout);
                tracing::debug!(phase = %request.phase, bytes = stdout.len(), "agent finished");
                let stderr = String::from_utf8_lossy(&output.stderr);
                Ok(self.classify(output.status, &stderr))
            }
        }
    }
}

#[cfg(unix)]
fn was_interrupted(status: ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.code() == Some(SIGINT_EXIT_CODE) || status.signal() == Some(2)
}

#[cfg(not(unix))]
fn was_interrupted(status: ExitStatus) -> bool {
    status.code() == Some(SIGINT_EXIT_CODE)
}
