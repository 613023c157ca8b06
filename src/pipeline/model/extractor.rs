use std::sync::Arc;

use super::client::LlmClient;
use super::parser::{parse_model_reply, ModelTransaction};
use super::prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use super::ModelError;
use crate::config::{BoundsConfig, EngineConfig};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::extraction::confidence::{
    detect_red_flags, model_confidence, score_transaction, thresholds,
};
use crate::pipeline::extraction::selector::ParagraphSelector;
use crate::pipeline::extraction::types::{
    ExtractedTransaction, ExtractionMethod, RawDocument, TextUnit,
};
use crate::pipeline::extraction::validation::{derive_missing, validate_transaction};
use crate::pipeline::extraction::ExtractionError;

/// Records produced by one fallback call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FallbackOutput {
    pub transactions: Vec<ExtractedTransaction>,
    /// Parsed records that failed validation or scored too low.
    pub rejected: usize,
    /// Records the parser dropped as cumulative or incomplete.
    pub skipped: usize,
}

/// Sends filtered document text to the external model and validates
/// what comes back against the same invariants as pattern records.
pub struct FallbackExtractor {
    client: Arc<dyn LlmClient>,
    model_name: String,
    /// Asset named in the prompt; the first configured asset term.
    asset_name: String,
    selector: ParagraphSelector,
    bounds: BoundsConfig,
    max_input_chars: usize,
}

impl FallbackExtractor {
    pub fn new(
        client: Arc<dyn LlmClient>,
        config: &EngineConfig,
    ) -> Result<Self, ExtractionError> {
        let asset_name = config
            .keywords
            .asset_terms
            .first()
            .cloned()
            .ok_or_else(|| ExtractionError::Config("asset_terms must not be empty".into()))?;
        Ok(Self {
            client,
            model_name: config.model.model_name.clone(),
            asset_name,
            selector: ParagraphSelector::new(config)?,
            bounds: config.bounds.clone(),
            max_input_chars: config.selector.max_model_input_chars,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Run the fallback on a document's units. An empty filtered text
    /// skips the call entirely.
    pub fn extract(
        &self,
        doc: &RawDocument,
        units: &[TextUnit],
        cancel: Option<&CancelToken>,
    ) -> Result<FallbackOutput, ModelError> {
        let filtered = self.selector.relevant_text(units, self.max_input_chars);
        if filtered.trim().is_empty() {
            tracing::debug!(document = %doc.id, "No relevant text for model fallback");
            return Ok(FallbackOutput::default());
        }

        let prompt = build_extraction_prompt(doc, &self.asset_name, &filtered);
        tracing::debug!(
            document = %doc.id,
            model = %self.model_name,
            prompt_chars = prompt.len(),
            "Calling model fallback"
        );
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(ModelError::Cancelled);
        }
        let reply = self
            .client
            .generate(&self.model_name, &prompt, EXTRACTION_SYSTEM_PROMPT, cancel)?;
        let parsed = parse_model_reply(&reply)?;

        let mut output = FallbackOutput {
            skipped: parsed.skipped,
            ..Default::default()
        };
        for candidate in parsed.transactions {
            match self.to_record(candidate) {
                Some(tx) => output.transactions.push(tx),
                None => output.rejected += 1,
            }
        }

        tracing::info!(
            document = %doc.id,
            records = output.transactions.len(),
            rejected = output.rejected,
            skipped = output.skipped,
            "Model fallback complete"
        );
        Ok(output)
    }

    /// Undated candidates stay undated and take the undated penalty.
    fn to_record(&self, candidate: ModelTransaction) -> Option<ExtractedTransaction> {
        let (amount, fiat, price) =
            derive_missing(candidate.asset_amount, candidate.fiat_amount, candidate.unit_price)?;
        let excerpt = candidate
            .source_excerpt
            .or(candidate.rationale)
            .unwrap_or_default();

        let mut tx = ExtractedTransaction {
            date: candidate.date,
            kind: candidate.kind,
            asset_amount: Some(amount),
            fiat_amount: Some(fiat),
            unit_price: Some(price),
            holdings_after: None,
            source_excerpt: format!("[model:{}] {}", self.model_name, excerpt),
            method: ExtractionMethod::Model,
            confidence: model_confidence(candidate.confidence),
        };

        if let Err(reason) = validate_transaction(&tx, &self.bounds) {
            tracing::debug!(%reason, "Model record rejected");
            return None;
        }
        let flags = detect_red_flags(&tx, &self.bounds);
        tx.confidence = score_transaction(tx.confidence, &flags);
        if tx.confidence < thresholds::REJECT {
            tracing::debug!(confidence = tx.confidence, "Model record below threshold");
            return None;
        }
        Some(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::types::{FilingType, TransactionKind, UnitKind};
    use crate::pipeline::model::client::MockLlmClient;
    use chrono::NaiveDate;
    use std::time::{Duration, Instant};

    const REPLY: &str = r#"{"transactions": [
        {"btc_amount": 21454, "usd_amount": 250000000, "type": "individual",
         "date": "2020-08-11", "confidence": 0.95, "source_excerpt": "purchased 21,454 bitcoins"}
    ], "analysis": "one purchase", "confidence": 0.9, "reasoning": "explicit"}"#;

    fn doc() -> RawDocument {
        RawDocument::new(
            "doc-1",
            FilingType::Current,
            NaiveDate::from_ymd_opt(2020, 8, 12).unwrap(),
            b"",
        )
    }

    fn units() -> Vec<TextUnit> {
        vec![
            TextUnit {
                text: "The Company announced that it had purchased bitcoin during the third quarter."
                    .into(),
                kind: UnitKind::Paragraph,
            },
            TextUnit {
                text: "Revenue increased year over year.".into(),
                kind: UnitKind::Paragraph,
            },
        ]
    }

    fn extractor(client: Arc<dyn LlmClient>) -> FallbackExtractor {
        FallbackExtractor::new(client, &EngineConfig::default()).unwrap()
    }

    #[test]
    fn model_records_validated_and_tagged() {
        let client = Arc::new(MockLlmClient::new(REPLY));
        let out = extractor(client.clone()).extract(&doc(), &units(), None).unwrap();
        assert_eq!(out.transactions.len(), 1);
        let tx = &out.transactions[0];
        assert_eq!(tx.method, ExtractionMethod::Model);
        assert_eq!(tx.kind, TransactionKind::Purchase);
        assert!(tx.source_excerpt.starts_with("[model:llama3.1] "));
        assert!(tx.confidence <= thresholds::MODEL_CAP);
        assert!((tx.unit_price.unwrap() - 250_000_000.0 / 21454.0).abs() < 1e-6);
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn only_relevant_text_is_sent() {
        let client = Arc::new(MockLlmClient::new(REPLY));
        extractor(client.clone()).extract(&doc(), &units(), None).unwrap();
        let prompt = client.last_prompt().unwrap();
        assert!(prompt.contains("purchased bitcoin"));
        assert!(!prompt.contains("Revenue increased"));
    }

    #[test]
    fn no_relevant_text_skips_call() {
        let client = Arc::new(MockLlmClient::new(REPLY));
        let only_noise = vec![units().remove(1)];
        let out = extractor(client.clone()).extract(&doc(), &only_noise, None).unwrap();
        assert!(out.transactions.is_empty());
        assert_eq!(client.call_count(), 0);
    }

    #[test]
    fn missing_date_stays_undated_and_penalized() {
        let reply = r#"{"transactions": [
            {"btc_amount": 100, "unit_price": 30000, "type": "individual"}
        ]}"#;
        let out = extractor(Arc::new(MockLlmClient::new(reply)))
            .extract(&doc(), &units(), None)
            .unwrap();
        let tx = &out.transactions[0];
        assert_eq!(tx.date, None);
        assert_eq!(tx.fiat_amount, Some(3_000_000.0));
        // Missing confidence (0.70) less the undated penalty (0.10).
        assert!((tx.confidence - 0.60).abs() < 1e-5);
    }

    #[test]
    fn implausible_model_records_rejected() {
        let reply = r#"{"transactions": [{"btc_amount": 1, "usd_amount": 5, "type": "individual"}]}"#;
        let out = extractor(Arc::new(MockLlmClient::new(reply)))
            .extract(&doc(), &units(), None)
            .unwrap();
        assert!(out.transactions.is_empty());
        assert_eq!(out.rejected, 1);
    }

    #[test]
    fn prose_only_reply_is_error() {
        let result = extractor(Arc::new(MockLlmClient::new("Nothing found.")))
            .extract(&doc(), &units(), None);
        assert!(matches!(result, Err(ModelError::NoJsonFound)));
    }

    #[test]
    fn client_failure_propagates() {
        let result = extractor(Arc::new(MockLlmClient::failing("refused")))
            .extract(&doc(), &units(), None);
        assert!(matches!(result, Err(ModelError::Connection(_))));
    }

    #[test]
    fn cancellation_aborts_slow_call() {
        let client = Arc::new(MockLlmClient::new(REPLY).with_delay(Duration::from_secs(5)));
        let token = CancelToken::with_timeout(Duration::from_millis(50));
        let started = Instant::now();
        let result = extractor(client.clone()).extract(&doc(), &units(), Some(&token));
        assert!(matches!(result, Err(ModelError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
        // Nothing is left running once the call returns.
        assert_eq!(client.in_flight(), 0);
    }

    #[test]
    fn already_cancelled_token_skips_call() {
        let client = Arc::new(MockLlmClient::new(REPLY));
        let token = CancelToken::new();
        token.cancel();
        let result = extractor(client.clone()).extract(&doc(), &units(), Some(&token));
        assert!(matches!(result, Err(ModelError::Cancelled)));
        assert_eq!(client.call_count(), 0);
    }

    #[test]
    fn prompt_uses_first_asset_term() {
        let mut config = EngineConfig::default();
        config.keywords.asset_terms = vec!["ether".into(), "eth".into()];
        let client = Arc::new(MockLlmClient::new(REPLY));
        let units = vec![TextUnit {
            text: "The Company purchased 1,000 ether during the quarter.".into(),
            kind: UnitKind::Paragraph,
        }];
        FallbackExtractor::new(client.clone(), &config)
            .unwrap()
            .extract(&doc(), &units, None)
            .unwrap();
        assert!(client.last_prompt().unwrap().contains("The asset is ether."));
    }

    #[test]
    fn uncancelled_token_returns_reply() {
        let token = CancelToken::new();
        let out = extractor(Arc::new(MockLlmClient::new(REPLY)))
            .extract(&doc(), &units(), Some(&token))
            .unwrap();
        assert_eq!(out.transactions.len(), 1);
    }
}
