//! Agent prompts for each phase.
//!
//! The system prompt is the phase's built-in text (or the operator's
//! `<home>/prompts/<phase>.md`) followed by output instructions. The initial
//! message carries the session's task, context, repositories and the paths
//! of artifacts earlier phases produced.

use std::fmt::Write as _;
use std::path::Path;

use super::phases;
use crate::artifact::{ArtifactStore, phase_filename};
use crate::config::Config;
use crate::phase::Phase;
use crate::session::Session;

const INVESTIGATE_PROMPT: &str = "You are investigating a software engineering task before any code is changed. \
Explore the relevant code, reproduce or trace the problem, and identify root causes, constraints and risks. \
Work with the operator interactively when something is ambiguous. Do not modify source files.";

const PLAN_PROMPT: &str = "You are writing the implementation plan for a task that has already been investigated. \
Read the investigation summary, then produce a step-by-step implementation guide: files to change, \
the order of changes, tests to add, and how to verify the result. Do not modify source files.";

const REVIEW_PROMPT: &str = "You are reviewing an implementation guide before it is executed. \
Check it against the codebase for missing steps, wrong assumptions and risky changes. \
Rewrite the guide with your corrections and add review notes explaining what changed. Do not modify source files.";

const EXECUTE_PROMPT: &str = "You are executing an approved implementation guide. \
Make the code changes it describes, keep them minimal, and run the relevant tests. \
Keep an execution log of what you changed and why, including any deviation from the guide.";

const VERIFY_PROMPT: &str = "You are verifying the changes made in the execute phase. \
Run the test suite and any checks the implementation guide lists, compare the result with the task, \
and write verification notes stating clearly what passed, what failed and what remains. Do not fix problems yourself.";

const SIMPLIFY_PROMPT: &str = "You are simplifying freshly verified changes. \
Remove dead code, needless indirection and duplication introduced by the change without altering behavior. \
Run the tests again afterwards.";

const CONCLUDE_PROMPT: &str = "You are concluding a research session. \
Using the investigation summary, answer the research question directly, list the evidence, \
and give concrete recommendations with their trade-offs.";

const RECORD_PROMPT: &str = "You are recording the outcome of a finished session. \
Write a milestone ledger with a short summary of what was done and a file manifest listing every file \
that was added, modified or deleted, one path per line.";

const CAPSULE_FORMAT: &str = "Record each significant decision or finding as its own block:

### Decision: <the question that had to be answered>
- **Choice**: <what was chosen or found>
- **Rationale**: <why>
- **Alternatives**: <option one>; <option two>
- **Significance**: architectural | implementation | context
- **Tags**: <comma-separated topics>";

pub fn builtin_prompt(phase: Phase) -> &'static str {
    match phase {
        Phase::Investigate => INVESTIGATE_PROMPT,
        Phase::Plan => PLAN_PROMPT,
        Phase::Review => REVIEW_PROMPT,
        Phase::Execute => EXECUTE_PROMPT,
        Phase::Verify => VERIFY_PROMPT,
        Phase::Simplify => SIMPLIFY_PROMPT,
        Phase::Conclude => CONCLUDE_PROMPT,
        Phase::Record => RECORD_PROMPT,
    }
}

/// Section headings the artifact must carry, shown to the agent.
fn required_headings(phase: Phase) -> &'static str {
    match phase {
        Phase::Investigate => "## Executive Summary",
        Phase::Plan => "## Implementation Guide",
        Phase::Review => "## Implementation Guide and ## Review Notes",
        Phase::Execute => "## Execution Log",
        Phase::Verify => "## Verification",
        Phase::Simplify => "",
        Phase::Conclude => "## Conclusion and ## Recommendations",
        Phase::Record => "## Summary and ## File Manifest",
    }
}

pub fn system_prompt(config: &Config, session: &Session, phase: Phase, output_dir: &Path) -> String {
    let mut prompt = config
        .prompt_override(phase)
        .unwrap_or_else(|| builtin_prompt(phase).to_string());

    if phases::profile(phase).produces_artifact {
        let _ = write!(
            prompt,
            "\n\n## Output\n\nWrite your result to `{}`.\nStart the file with this header:\n\n---\nsession: {}\nphase: {}\nstatus: draft\n---\n\nThe body must contain {}.",
            output_dir.join(phase_filename(phase.name())).display(),
            session.id,
            phase.name(),
            required_headings(phase),
        );
    }

    if matches!(phase, Phase::Investigate | Phase::Plan | Phase::Review | Phase::Execute | Phase::Conclude) {
        prompt.push_str("\n\n## Decisions\n\n");
        prompt.push_str(CAPSULE_FORMAT);
    }
    prompt
}

pub fn initial_message(
    config: &Config,
    artifacts: &ArtifactStore,
    session: &Session,
    phase: Phase,
    attempt: Option<u32>,
) -> String {
    let mut msg = String::new();
    let _ = writeln!(msg, "Session: {}", session.id);
    let _ = writeln!(msg, "Phase: {}", phase);
    let _ = writeln!(msg, "\nTask: {}", session.description);
    if !session.context.trim().is_empty() {
        let _ = writeln!(msg, "\nContext:\n{}", session.context.trim());
    }

    msg.push_str("\nRepositories:\n");
    for repo in &session.repos {
        let _ = writeln!(msg, "- {}: {}", repo, config.resolve_repo(repo).display());
    }

    let prior: Vec<(Phase, std::path::PathBuf)> = Phase::ALL
        .into_iter()
        .filter(|p| p.rank() < phase.rank())
        .map(|p| (p, artifacts.session_artifact_path(&session.id, p.name())))
        .filter(|(_, path)| path.exists())
        .collect();
    if !prior.is_empty() {
        msg.push_str("\nArtifacts from earlier phases:\n");
        for (p, path) in prior {
            let _ = writeln!(msg, "- {}: {}", p, path.display());
        }
    }

    if let Some(n) = attempt
        && n > 1
    {
        let _ = writeln!(
            msg,
            "\nThis is execution attempt {}. The previous attempt failed verification; read the verification notes above before changing anything.",
            n
        );
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Artifact, ArtifactHeader};
    use crate::config::CairnToml;
    use crate::session::SessionMode;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn config(home: &Path) -> Config {
        Config::from_parts(
            home.to_path_buf(),
            &CairnToml::default(),
            PathBuf::from("/work"),
            false,
            false,
        )
    }

    fn session() -> Session {
        let mut s = Session::new("s1", "Fix login", SessionMode::Standard, vec!["api".into()]);
        s.context = "Users get logged out".into();
        s
    }

    #[test]
    fn test_system_prompt_names_output_file_and_header() {
        let dir = tempdir().unwrap();
        let prompt = system_prompt(&config(dir.path()), &session(), Phase::Execute, Path::new("/out"));
        assert!(prompt.starts_with(EXECUTE_PROMPT));
        assert!(prompt.contains("/out/execution_log.md"));
        assert!(prompt.contains("session: s1"));
        assert!(prompt.contains("### Decision:"));
    }

    #[test]
    fn test_simplify_prompt_has_no_output_section() {
        let dir = tempdir().unwrap();
        let prompt = system_prompt(&config(dir.path()), &session(), Phase::Simplify, Path::new("/out"));
        assert_eq!(prompt, SIMPLIFY_PROMPT);
    }

    #[test]
    fn test_override_replaces_builtin_prompt() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        std::fs::create_dir_all(&cfg.prompts_dir).unwrap();
        std::fs::write(cfg.prompts_dir.join("record.md"), "My ledger rules.").unwrap();
        let prompt = system_prompt(&cfg, &session(), Phase::Record, Path::new("/out"));
        assert!(prompt.starts_with("My ledger rules."));
        assert!(prompt.contains("milestone_ledger.md"));
    }

    #[test]
    fn test_initial_message_lists_context_repos_and_prior_artifacts() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let store = ArtifactStore::new(dir.path().join("sessions"));
        let mut inv = Artifact::new(
            ArtifactHeader {
                phase: "investigate".into(),
                ..Default::default()
            },
            "## Executive Summary",
        );
        store.store_session_level("s1", &mut inv).unwrap();

        let msg = initial_message(&cfg, &store, &session(), Phase::Plan, None);
        assert!(msg.contains("Task: Fix login"));
        assert!(msg.contains("Users get logged out"));
        assert!(msg.contains("- api: /work/api"));
        assert!(msg.contains("investigation_summary.md"));

        let msg = initial_message(&cfg, &store, &session(), Phase::Execute, Some(2));
        assert!(msg.contains("execution attempt 2"));
    }
}
