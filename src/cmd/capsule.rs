//! Capsule queries and curation: `cairn capsules ...`.

use anyhow::{Context, Result};
use console::style;

use cairn::capsule::{
    Capsule, CapsuleFilter, CapsuleStatus, CapsuleType, Confirmation, Origin, Significance,
};
use cairn::config::Config;
use cairn::ingest::Stores;
use cairn::phase::QUICKFIX_SEED;
use cairn::session::SessionMode;
use cairn::ui::SessionUI;
use cairn::ui::icons::CHECK;

use super::super::CapsuleCommands;

pub fn cmd_capsules(config: &Config, command: CapsuleCommands) -> Result<()> {
    let stores = Stores::new(&config.sessions_dir);
    let ui = SessionUI::new(config.verbose);

    match command {
        CapsuleCommands::List {
            session,
            repo,
            phase,
            tag,
            status,
            capsule_type,
            significance,
            include_invalidated,
            evolution,
        } => {
            let filter = CapsuleFilter {
                session,
                repo,
                phase,
                tag,
                status: status.as_deref().map(str::parse::<CapsuleStatus>).transpose()?,
                capsule_type: capsule_type
                    .as_deref()
                    .map(str::parse::<CapsuleType>)
                    .transpose()?,
                significance: significance
                    .as_deref()
                    .map(str::parse::<Significance>)
                    .transpose()?,
                include_invalidated,
                show_evolution: evolution,
            };
            let capsules = stores.capsules.list(&filter)?;
            if capsules.is_empty() {
                println!("No capsules match.");
                return Ok(());
            }
            for capsule in &capsules {
                ui.capsule_row(capsule);
            }
            println!();
            println!("{} capsule(s)", capsules.len());
        }
        CapsuleCommands::Chain { id, transitive } => {
            if transitive {
                let chain = stores.capsules.get_chain_transitive(&id)?;
                for (i, capsule) in chain.iter().enumerate() {
                    let marker = if capsule.id == id { "*" } else { " " };
                    println!("{} {}. {}", marker, i + 1, style(&capsule.id).dim());
                    println!("     {} {}", capsule.question, style(&capsule.status).dim());
                }
            } else {
                let chain = stores.capsules.get_chain(&id)?;
                if let Some(newer) = &chain.superseded_by {
                    println!("{}", style("Superseded by:").bold());
                    ui.capsule_row(newer);
                    println!();
                }
                println!("{}", style("Capsule:").bold());
                print_detail(&chain.capsule);
                if !chain.supersedes.is_empty() {
                    println!();
                    println!("{}", style("Supersedes:").bold());
                    for older in &chain.supersedes {
                        ui.capsule_row(older);
                    }
                }
            }
        }
        CapsuleCommands::Invalidate {
            id,
            reason,
            learned,
            superseded_by,
        } => {
            let capsule = stores.capsules.invalidate(
                &id,
                &reason,
                learned.as_deref(),
                superseded_by.as_deref(),
            )?;
            println!("{}Invalidated {}", CHECK, style(&capsule.id).bold());
            if let Some(successor) = &capsule.superseded_by {
                println!("   Superseded by {}", successor);
            }
        }
        CapsuleCommands::Record {
            session,
            question,
            choice,
            rationale,
            phase,
            alternatives,
            tags,
            significance,
        } => {
            let record = stores
                .sessions
                .load(&session)
                .with_context(|| format!("Cannot record a decision for session {}", session))?;
            let phase = match phase {
                Some(phase) => phase,
                None if record.mode == SessionMode::Quickfix => QUICKFIX_SEED.to_string(),
                None => anyhow::bail!(
                    "--phase is required for {} sessions",
                    record.mode
                ),
            };

            let capsule_type = if alternatives.is_empty() {
                CapsuleType::Finding
            } else {
                CapsuleType::Decision
            };
            let mut capsule = Capsule::new(&record.id, phase, question)
                .with_choice(choice)
                .with_rationale(rationale.unwrap_or_default())
                .with_alternatives(alternatives)
                .with_type(capsule_type)
                .with_origin(Origin::Human)
                .with_confirmation(Confirmation::Explicit)
                .with_repos(record.repos.clone())
                .with_tags(tags);
            if let Some(significance) = significance {
                capsule = capsule.with_significance(significance.parse()?);
            }

            stores.capsules.store(&capsule)?;
            println!("{}Recorded {}", CHECK, style(&capsule.id).bold());
        }
    }
    Ok(())
}

fn print_detail(c: &Capsule) {
    println!("  ID:           {}", c.id);
    println!("  Session:      {}", c.session_id);
    println!("  Phase:        {}", c.phase);
    println!("  Question:     {}", c.question);
    if !c.choice.is_empty() {
        println!("  Choice:       {}", c.choice);
    }
    if !c.rationale.is_empty() {
        println!("  Rationale:    {}", c.rationale);
    }
    if !c.alternatives.is_empty() {
        println!("  Alternatives: {}", c.alternatives.join("; "));
    }
    println!("  Status:       {} ({})", c.status, c.capsule_type);
    if let Some(reason) = &c.invalidation_reason {
        println!("  Invalidated:  {}", reason);
    }
    if let Some(learned) = &c.learned {
        println!("  Learned:      {}", learned);
    }
    if !c.tags.is_empty() {
        println!("  Tags:         {}", c.tags.join(", "));
    }
    if !c.challenges.is_empty() {
        println!("  Challenges:   {}", c.challenges.len());
    }
}
