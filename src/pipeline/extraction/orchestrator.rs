use std::sync::Arc;

use super::classifier::StatementClassifier;
use super::dedup::{best_shares, merge_transactions};
use super::html::{decode_content, text_units};
use super::patterns::{PatternExtractor, PatternOutcome};
use super::selector::ParagraphSelector;
use super::shares::SharesExtractor;
use super::types::{
    ClassificationLabel, ExtractedTransaction, ExtractionResult, ExtractionStats, ProcessingError,
    ProcessingStage, RawDocument, TextUnit,
};
use super::ExtractionError;
use crate::config::{EngineConfig, FallbackMode};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::model::{FallbackExtractor, LlmClient, ModelError, OllamaClient};

/// Per-document treasury extraction engine.
/// Holds only immutable, config-compiled state; one instance can serve
/// any number of documents concurrently.
pub struct TreasuryExtractor {
    config: EngineConfig,
    selector: ParagraphSelector,
    classifier: StatementClassifier,
    patterns: PatternExtractor,
    shares: SharesExtractor,
    fallback: Option<FallbackExtractor>,
}

impl TreasuryExtractor {
    /// Pattern-only engine. Attach a model client with [`Self::with_model`].
    pub fn new(config: EngineConfig) -> Result<Self, ExtractionError> {
        config.validate()?;
        Ok(Self {
            selector: ParagraphSelector::new(&config)?,
            classifier: StatementClassifier::new(&config)?,
            patterns: PatternExtractor::new(&config)?,
            shares: SharesExtractor::new(&config)?,
            fallback: None,
            config,
        })
    }

    pub fn with_model(mut self, client: Arc<dyn LlmClient>) -> Result<Self, ExtractionError> {
        self.fallback = Some(FallbackExtractor::new(client, &self.config)?);
        Ok(self)
    }

    /// Attach an Ollama client built from the model section of the config.
    pub fn with_ollama(self) -> Result<Self, ExtractionError> {
        let client = OllamaClient::from_config(&self.config.model)
            .map_err(|e| ExtractionError::Config(e.to_string()))?;
        self.with_model(Arc::new(client))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full pipeline on one document. Never fails: parse and model
    /// problems are recorded in `errors` and the result carries whatever
    /// was extracted.
    pub fn extract_document(
        &self,
        doc: &RawDocument,
        cancel: Option<&CancelToken>,
    ) -> ExtractionResult {
        let span = tracing::info_span!(
            "extract_document",
            doc_id = %doc.id,
            filing_type = doc.filing_type.as_str()
        );
        let _enter = span.enter();

        let mut result = ExtractionResult::empty(doc);

        let units = match decode_content(&doc.content).and_then(|text| text_units(&text)) {
            Ok(units) => units,
            Err(e) => {
                tracing::warn!(error = %e, "Document could not be parsed");
                result
                    .errors
                    .push(ProcessingError::new(ProcessingStage::Parse, e.to_string()));
                return result;
            }
        };
        result.stats.units = units.len();

        let pattern_records = self.extract_patterns(&units, &mut result.stats);

        let share_records = self.shares.extract(&units, doc.filing_date);
        result.stats.share_candidates = share_records.len();
        result.shares_outstanding = best_shares(share_records);

        let mut records = pattern_records;
        if self.should_call_model(records.is_empty()) {
            records.extend(self.extract_with_model(doc, &units, cancel, &mut result));
        }

        let (transactions, merged) = merge_transactions(records);
        result.stats.duplicates_merged = merged;
        result.transactions = transactions;

        tracing::info!(
            candidates = result.stats.candidates,
            transactions = result.transactions.len(),
            shares = result.shares_outstanding.is_some(),
            errors = result.errors.len(),
            "Document extraction complete"
        );
        result
    }

    fn extract_patterns(
        &self,
        units: &[TextUnit],
        stats: &mut ExtractionStats,
    ) -> Vec<ExtractedTransaction> {
        let candidates = self.selector.select(units);
        stats.candidates = candidates.len();

        let mut records = Vec::new();
        for candidate in &candidates {
            let classification = self.classifier.classify(candidate);
            stats.record_label(classification.label);
            tracing::debug!(
                index = candidate.index,
                label = ?classification.label,
                reason = classification.reason,
                "Candidate classified"
            );
            if classification.label != ClassificationLabel::IndividualTransaction {
                continue;
            }

            match self.patterns.extract(&classification.scoped_text) {
                PatternOutcome::Extracted(tx) => records.push(tx),
                PatternOutcome::Rejected { reason, confidence } => {
                    stats.rejected += 1;
                    tracing::debug!(
                        index = candidate.index,
                        %reason,
                        confidence,
                        "Pattern record rejected"
                    );
                }
                PatternOutcome::NoMatch => stats.pattern_misses += 1,
            }
        }
        records
    }

    fn should_call_model(&self, patterns_empty: bool) -> bool {
        if self.fallback.is_none() {
            return false;
        }
        match self.config.model.mode {
            FallbackMode::Disabled => false,
            FallbackMode::OnEmpty => patterns_empty,
            FallbackMode::Always => true,
        }
    }

    fn extract_with_model(
        &self,
        doc: &RawDocument,
        units: &[TextUnit],
        cancel: Option<&CancelToken>,
        result: &mut ExtractionResult,
    ) -> Vec<ExtractedTransaction> {
        let Some(fallback) = &self.fallback else {
            return Vec::new();
        };
        result.stats.model_calls += 1;

        match fallback.extract(doc, units, cancel) {
            Ok(output) => {
                result.stats.rejected += output.rejected;
                result.stats.model_records += output.transactions.len();
                output.transactions
            }
            Err(e) => {
                match &e {
                    ModelError::Cancelled => {
                        tracing::warn!("Model call cancelled, keeping pattern output")
                    }
                    _ => tracing::warn!(
                        error = %e,
                        model = fallback.model_name(),
                        "Model fallback failed"
                    ),
                }
                result
                    .errors
                    .push(ProcessingError::new(ProcessingStage::Model, e.to_string()));
                Vec::new()
            }
        }
    }
}
