//! Deterministic extraction of treasury events from filing text.
//!
//! ```text
//! RawDocument → html → selector → classifier → patterns → confidence
//!                                              ↘ shares            ↘ dedup → ExtractionResult
//! ```
//! The external-model fallback lives in `pipeline::model` and feeds the
//! same dedup step.

pub mod types;
pub mod keywords;
pub mod dates;
pub mod html;
pub mod selector;
pub mod classifier;
pub mod validation;
pub mod confidence;
pub mod patterns;
pub mod shares;
pub mod dedup;
pub mod orchestrator;

pub use types::*;
pub use keywords::*;
pub use selector::*;
pub use classifier::*;
pub use patterns::*;
pub use shares::*;
pub use dedup::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Document could not be read as HTML or text: {0}")]
    MalformedInput(String),

    #[error("Document is empty")]
    EmptyDocument,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
