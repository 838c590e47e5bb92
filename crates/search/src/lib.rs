pub mod document;
pub mod projector;

pub use document::SearchDocument;
pub use projector::{ProjectResult, RebuildReport, SearchError, SearchProjector};
