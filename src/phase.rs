//! Phase vocabulary shared by the stores and the orchestrator.
//!
//! A `Phase` is one stage of a session pipeline. Capsules and artifacts refer
//! to phases by name, so free-form names (e.g. [`QUICKFIX_SEED`]) are also
//! accepted wherever a phase string is stored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Phase name used for decisions recorded when a quickfix session is opened.
pub const QUICKFIX_SEED: &str = "quickfix-seed";

/// Fixed ordering used when deduplicating capsules: later phases win.
const PHASE_RANKS: &[(&str, u8)] = &[
    (QUICKFIX_SEED, 0),
    ("investigate", 1),
    ("plan", 2),
    ("review", 3),
    ("execute", 4),
    ("verify", 5),
    ("simplify", 6),
    ("conclude", 6),
    ("record", 7),
];

/// A stage of the session pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Investigate,
    Plan,
    Review,
    Execute,
    Verify,
    Simplify,
    Conclude,
    Record,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Investigate,
        Phase::Plan,
        Phase::Review,
        Phase::Execute,
        Phase::Verify,
        Phase::Simplify,
        Phase::Conclude,
        Phase::Record,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Investigate => "investigate",
            Phase::Plan => "plan",
            Phase::Review => "review",
            Phase::Execute => "execute",
            Phase::Verify => "verify",
            Phase::Simplify => "simplify",
            Phase::Conclude => "conclude",
            Phase::Record => "record",
        }
    }

    pub fn rank(&self) -> u8 {
        phase_rank(self.name())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Phase::ALL
            .into_iter()
            .find(|p| p.name() == lower)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid phase '{}'. Valid values: investigate, plan, review, execute, verify, simplify, conclude, record",
                    s
                )
            })
    }
}

/// Rank of a phase name for "latest phase wins" deduplication.
///
/// Unknown names rank lowest, alongside the quickfix seed.
pub fn phase_rank(name: &str) -> u8 {
    PHASE_RANKS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, r)| *r)
        .unwrap_or(0)
}

/// Phase names in document order, used for capsule document sections.
pub fn ordered_phase_names() -> impl Iterator<Item = &'static str> {
    [
        QUICKFIX_SEED,
        "investigate",
        "plan",
        "review",
        "execute",
        "verify",
        "simplify",
        "conclude",
        "record",
    ]
    .into_iter()
}
