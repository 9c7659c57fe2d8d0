//! Data models for narramine.

mod extraction;
mod narrative;

pub use extraction::{
    AttemptStatus, EnthusiasmLevel, ExtractionAttempt, FailedExtraction, ProjectType,
    PromptVersion, StructuredExtraction,
};
pub use narrative::{normalize_text, Narrative};
