use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cairn::config::Config;
use cairn::logging::init_logging;

mod cmd;

#[derive(Parser)]
#[command(name = "cairn")]
#[command(version, about = "Drive a coding agent through investigate, plan, execute and record")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer every continuation gate with yes
    #[arg(long, global = true)]
    pub yes: bool,

    /// State directory (defaults to ~/.cairn)
    #[arg(long, global = true, env = "CAIRN_HOME")]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open a new session
    New {
        description: String,
        /// Repository the session works in (repeatable; the first is primary)
        #[arg(short, long = "repo", required = true)]
        repos: Vec<String>,
        /// standard, quickfix or research
        #[arg(short, long, default_value = "standard")]
        mode: String,
        /// Free-text context handed to every phase
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        author: Option<String>,
        /// Session this one replaces (repeatable)
        #[arg(long)]
        supersedes: Vec<String>,
        /// Session this one builds on (repeatable)
        #[arg(long)]
        extends: Vec<String>,
    },
    /// Run a session from its recorded status
    Run { id: String },
    /// Resume a paused or interrupted session
    Resume {
        id: String,
        /// Restart from this phase instead of the recorded status
        #[arg(long)]
        from: Option<String>,
    },
    /// Show one session, or list them all
    Status { id: Option<String> },
    Pause { id: String },
    Abandon { id: String },
    /// Query and curate decision capsules
    Capsules {
        #[command(subcommand)]
        command: CapsuleCommands,
    },
    /// Ingest artifacts orphaned by a crash and advance their sessions
    Recover {
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum CapsuleCommands {
    List {
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "type")]
        capsule_type: Option<String>,
        #[arg(long)]
        significance: Option<String>,
        #[arg(long)]
        include_invalidated: bool,
        /// Show every phase's version of a question
        #[arg(long)]
        evolution: bool,
    },
    /// Show what a capsule supersedes and what superseded it
    Chain {
        id: String,
        /// Follow supersession links all the way instead of one hop
        #[arg(long)]
        transitive: bool,
    },
    Invalidate {
        id: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        learned: Option<String>,
        #[arg(long)]
        superseded_by: Option<String>,
    },
    /// Record a decision by hand
    Record {
        session: String,
        #[arg(long)]
        question: String,
        #[arg(long)]
        choice: String,
        #[arg(long)]
        rationale: Option<String>,
        /// Defaults to quickfix-seed for quickfix sessions
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        alternatives: Vec<String>,
        #[arg(long)]
        tags: Vec<String>,
        #[arg(long)]
        significance: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::new(cli.home.clone(), cli.yes, cli.verbose)?;
    config.ensure_directories()?;
    let _guard = init_logging(&config.logs_dir, cli.verbose)?;

    match &cli.command {
        Commands::New {
            description,
            repos,
            mode,
            context,
            author,
            supersedes,
            extends,
        } => cmd::cmd_new(
            &config,
            cmd::NewArgs {
                description,
                repos,
                mode,
                context: context.as_deref(),
                author: author.as_deref(),
                supersedes,
                extends,
            },
        )?,
        Commands::Run { id } => cmd::cmd_run(&config, id).await?,
        Commands::Resume { id, from } => cmd::cmd_resume(&config, id, from.as_deref()).await?,
        Commands::Status { id } => cmd::cmd_status(&config, id.as_deref())?,
        Commands::Pause { id } => cmd::cmd_pause(&config, id)?,
        Commands::Abandon { id } => cmd::cmd_abandon(&config, id)?,
        Commands::Capsules { command } => cmd::cmd_capsules(&config, command.clone())?,
        Commands::Recover { dry_run } => cmd::cmd_recover(&config, *dry_run)?,
    }

    Ok(())
}
