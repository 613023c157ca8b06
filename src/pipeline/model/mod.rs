//! External-model fallback extraction.
//!
//! Used when the deterministic pattern pass finds nothing (or always, in
//! cross-check mode). Every failure here is non-fatal: it is logged and
//! the document keeps whatever the pattern pass produced.

pub mod client;
pub mod prompt;
pub mod parser;
pub mod extractor;

pub use client::*;
pub use prompt::*;
pub use parser::*;
pub use extractor::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model service is not reachable at {0}")]
    Connection(String),

    #[error("Model request timed out after {0}s")]
    Timeout(u64),

    #[error("Model service returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("No JSON object found in model reply")]
    NoJsonFound,

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error("Model call cancelled")]
    Cancelled,
}
