pub mod document;
pub mod loaders;

pub use document::{ArtifactRef, DocumentEvent, Section, SectionOutcome, SectionResult};
pub use loaders::load_inbox_events;
