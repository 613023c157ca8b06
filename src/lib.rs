//! Treasury event extraction from regulatory filings.
//!
//! Turns raw filing documents (HTML or plain text) into dated asset
//! purchase/sale records and a best shares-outstanding figure, using
//! keyword selection, rule-based classification, ordered numeric
//! templates, and an optional external-model fallback.

pub mod config;
pub mod pipeline;

pub use config::EngineConfig;
pub use pipeline::batch::{BatchOptions, BatchRunner};
pub use pipeline::cancel::CancelToken;
pub use pipeline::extraction::{ExtractionError, ExtractionResult, RawDocument, TreasuryExtractor};
pub use pipeline::model::{LlmClient, ModelError, OllamaClient};

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to the
/// crate default. Safe to call more than once.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
    }
}
