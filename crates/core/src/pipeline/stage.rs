//! The fixed stage sequence of a story run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of the pipeline. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Simplify,
    Synthesize,
    Transcribe,
    SelectBackground,
    Assemble,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Simplify,
        Stage::Synthesize,
        Stage::Transcribe,
        Stage::SelectBackground,
        Stage::Assemble,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Simplify => "simplify",
            Stage::Synthesize => "synthesize",
            Stage::Transcribe => "transcribe",
            Stage::SelectBackground => "select_background",
            Stage::Assemble => "assemble",
        }
    }

    /// Stages that consume this stage's output, directly or not.
    pub fn downstream(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().filter(move |s| *s > self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
