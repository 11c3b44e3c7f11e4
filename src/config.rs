//! Configuration for cairn.
//!
//! Settings are layered: `<home>/cairn.toml`, then environment variables
//! (`CAIRN_AGENT_CMD`, `SKIP_PERMISSIONS`), then command-line flags.
//!
//! ```toml
//! [agent]
//! command = "claude"
//! skip_permissions = true
//! extra_flags = ["--model", "opus"]
//!
//! [orchestrator]
//! auto_continue = ["investigate", "plan"]
//! workspace_root = "/home/me/src"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::phase::Phase;

pub const CONFIG_FILE: &str = "cairn.toml";
pub const HOME_ENV: &str = "CAIRN_HOME";
const DEFAULT_HOME_DIR: &str = ".cairn";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent executable
    #[serde(default = "default_agent_command")]
    pub command: String,
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
    /// Passed to the agent verbatim, after the built-in flags
    #[serde(default)]
    pub extra_flags: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            skip_permissions: default_skip_permissions(),
            extra_flags: Vec::new(),
        }
    }
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_skip_permissions() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Phases whose continuation prompt is skipped
    #[serde(default)]
    pub auto_continue: Vec<String>,
    /// Directory relative repo ids resolve against
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
}

/// On-disk `cairn.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CairnToml {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl CairnToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse cairn.toml")
    }

    pub fn load_or_default(home: &Path) -> Result<Self> {
        let path = home.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize cairn.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Agent command, with `CAIRN_AGENT_CMD` taking precedence over the file.
    pub fn agent_command(&self) -> String {
        std::env::var("CAIRN_AGENT_CMD").unwrap_or_else(|_| self.agent.command.clone())
    }

    /// `SKIP_PERMISSIONS=false` turns permission skipping off.
    pub fn skip_permissions(&self) -> bool {
        if let Ok(value) = std::env::var("SKIP_PERMISSIONS") {
            return value != "false";
        }
        self.agent.skip_permissions
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub sessions_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub agent_cmd: String,
    pub skip_permissions: bool,
    pub extra_flags: Vec<String>,
    pub auto_continue: Vec<String>,
    pub workspace_root: PathBuf,
    /// `--yes`: answer every continuation gate with yes
    pub assume_yes: bool,
    pub verbose: bool,
}

impl Config {
    /// Build the runtime config from the home directory and CLI flags.
    pub fn new(home: Option<PathBuf>, assume_yes: bool, verbose: bool) -> Result<Self> {
        let home = resolve_home(home)?;
        let file = CairnToml::load_or_default(&home)?;
        let workspace_root = match file.orchestrator.workspace_root.clone() {
            Some(root) => root,
            None => std::env::current_dir().context("Failed to resolve current directory")?,
        };
        Ok(Self::from_parts(home, &file, workspace_root, assume_yes, verbose))
    }

    pub fn from_parts(
        home: PathBuf,
        file: &CairnToml,
        workspace_root: PathBuf,
        assume_yes: bool,
        verbose: bool,
    ) -> Self {
        Self {
            sessions_dir: home.join("sessions"),
            logs_dir: home.join("logs"),
            prompts_dir: home.join("prompts"),
            home,
            agent_cmd: file.agent_command(),
            skip_permissions: file.skip_permissions(),
            extra_flags: file.agent.extra_flags.clone(),
            auto_continue: file.orchestrator.auto_continue.clone(),
            workspace_root,
            assume_yes,
            verbose,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.sessions_dir)
            .context("Failed to create sessions directory")?;
        std::fs::create_dir_all(&self.logs_dir).context("Failed to create logs directory")?;
        Ok(())
    }

    /// Flags passed to every agent invocation.
    pub fn agent_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.skip_permissions {
            flags.push("--dangerously-skip-permissions".to_string());
        }
        flags.extend(self.extra_flags.iter().cloned());
        flags
    }

    /// Absolute path of a repo id; relative ids resolve against the workspace root.
    pub fn resolve_repo(&self, repo: &str) -> PathBuf {
        let path = Path::new(repo);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    pub fn is_auto_continue(&self, phase: Phase) -> bool {
        self.assume_yes || self.auto_continue.iter().any(|p| p == phase.name())
    }

    /// Operator-supplied system prompt for a phase, if one exists.
    pub fn prompt_override(&self, phase: Phase) -> Option<String> {
        let path = self.prompts_dir.join(format!("{}.md", phase.name()));
        std::fs::read_to_string(path).ok()
    }
}

/// `--home`, else `CAIRN_HOME`, else `~/.cairn`.
pub fn resolve_home(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(home) = flag {
        return Ok(home);
    }
    if let Ok(home) = std::env::var(HOME_ENV)
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|h| h.join(DEFAULT_HOME_DIR))
        .context("Could not determine home directory; set CAIRN_HOME or pass --home")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let toml = CairnToml::parse("").unwrap();
        assert_eq!(toml.agent.command, "claude");
        assert!(toml.agent.skip_permissions);
        assert!(toml.orchestrator.auto_continue.is_empty());
        assert!(toml.orchestrator.workspace_root.is_none());
    }

    #[test]
    fn test_parse_full_file() {
        let content = r#"
[agent]
command = "my-agent"
skip_permissions = false
extra_flags = ["--model", "opus"]

[orchestrator]
auto_continue = ["investigate"]
workspace_root = "/src"
"#;
        let toml = CairnToml::parse(content).unwrap();
        assert_eq!(toml.agent.command, "my-agent");
        assert!(!toml.agent.skip_permissions);
        assert_eq!(toml.agent.extra_flags, vec!["--model", "opus"]);
        assert_eq!(toml.orchestrator.auto_continue, vec!["investigate"]);
        assert_eq!(toml.orchestrator.workspace_root, Some(PathBuf::from("/src")));
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        assert!(CairnToml::parse("[agent\ncommand =").is_err());
    }

    #[test]
    fn test_load_or_default_and_save() {
        let dir = tempdir().unwrap();
        let loaded = CairnToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.agent.command, "claude");

        let mut toml = CairnToml::default();
        toml.orchestrator.auto_continue = vec!["plan".into()];
        toml.save(&dir.path().join(CONFIG_FILE)).unwrap();
        let loaded = CairnToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.orchestrator.auto_continue, vec!["plan"]);
    }

    #[test]
    fn test_from_parts_layout_and_helpers() {
        let dir = tempdir().unwrap();
        let mut file = CairnToml::default();
        file.orchestrator.auto_continue = vec!["plan".into()];
        file.agent.extra_flags = vec!["--x".into()];
        let config = Config::from_parts(
            dir.path().to_path_buf(),
            &file,
            PathBuf::from("/work"),
            false,
            false,
        );
        assert_eq!(config.sessions_dir, dir.path().join("sessions"));
        assert_eq!(config.logs_dir, dir.path().join("logs"));
        assert_eq!(config.resolve_repo("api"), PathBuf::from("/work/api"));
        assert_eq!(config.resolve_repo("/abs/web"), PathBuf::from("/abs/web"));
        assert!(config.is_auto_continue(Phase::Plan));
        assert!(!config.is_auto_continue(Phase::Investigate));
        assert!(config.agent_flags().ends_with(&["--x".to_string()]));
    }

    #[test]
    fn test_assume_yes_continues_everything() {
        let dir = tempdir().unwrap();
        let config = Config::from_parts(
            dir.path().to_path_buf(),
            &CairnToml::default(),
            dir.path().to_path_buf(),
            true,
            false,
        );
        for phase in Phase::ALL {
            assert!(config.is_auto_continue(phase));
        }
    }

    #[test]
    fn test_prompt_override_reads_home_prompts() {
        let dir = tempdir().unwrap();
        let config = Config::from_parts(
            dir.path().to_path_buf(),
            &CairnToml::default(),
            dir.path().to_path_buf(),
            false,
            false,
        );
        assert!(config.prompt_override(Phase::Plan).is_none());
        std::fs::create_dir_all(&config.prompts_dir).unwrap();
        std::fs::write(config.prompts_dir.join("plan.md"), "custom plan prompt").unwrap();
        assert_eq!(
            config.prompt_override(Phase::Plan).as_deref(),
            Some("custom plan prompt")
        );
    }

    #[test]
    fn test_resolve_home_prefers_flag() {
        let home = resolve_home(Some(PathBuf::from("/tmp/explicit"))).unwrap();
        assert_eq!(home, PathBuf::from("/tmp/explicit"));
    }
}
