//! Background clip selection and alignment.

pub mod library;
pub mod plan;

use serde::{Deserialize, Serialize};

pub use library::{BackgroundLibrary, BackgroundSource};
pub use plan::{AspectPolicy, BackgroundPlan, CropRect, plan};

/// The clip chosen for a story and how it is fitted to the narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSelection {
    pub source: BackgroundSource,
    pub plan: BackgroundPlan,
}

impl BackgroundSelection {
    /// Plan `source` against `target_duration` seconds at the given output size.
    pub fn for_source(
        source: BackgroundSource,
        target_duration: f64,
        output_width: u32,
        output_height: u32,
    ) -> Result<Self, crate::error::ValidationError> {
        let aspect = AspectPolicy {
            source_width: source.width,
            source_height: source.height,
            output_width,
            output_height,
        };
        let plan = plan(source.duration, target_duration, aspect)?;
        Ok(Self { source, plan })
    }
}
