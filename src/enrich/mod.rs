//! Building blocks of one enrichment run. Everything here is either a pure
//! transform or a single best-effort call against a [`crate::llm::ChatCompletion`];
//! sequencing and persistence live in [`crate::pipeline`].

pub mod analysis;
pub mod dimensions;
pub mod merge;
pub mod models;
pub mod recover;
pub mod sanitize;
pub mod score;
pub mod seo;
pub mod vision;
