use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Filing category as declared by the retrieval collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingType {
    /// 10-K and equivalents.
    Annual,
    /// 10-Q and equivalents.
    Quarterly,
    /// Event-driven reports (8-K).
    Current,
    Other,
}

impl FilingType {
    /// Map an archive form code ("10-K", "8-K/A", ...) to a filing type.
    pub fn from_form(form: &str) -> Self {
        let base = form.trim().to_uppercase();
        let base = base.split('/').next().unwrap_or("");
        match base {
            "10-K" | "10-KT" | "20-F" | "40-F" => FilingType::Annual,
            "10-Q" | "10-QT" => FilingType::Quarterly,
            "8-K" | "6-K" => FilingType::Current,
            _ => FilingType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilingType::Annual => "annual",
            FilingType::Quarterly => "quarterly",
            FilingType::Current => "current",
            FilingType::Other => "other",
        }
    }

    /// Periodic reports carry balance sheets and cover-page share counts.
    pub fn is_periodic(&self) -> bool {
        matches!(self, FilingType::Annual | FilingType::Quarterly)
    }
}

/// Immutable input document. Owned by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    /// Accession or other archive identifier.
    pub id: String,
    pub filing_type: FilingType,
    pub filing_date: NaiveDate,
    pub url: Option<String>,
    pub content: Vec<u8>,
}

impl RawDocument {
    pub fn new(id: &str, filing_type: FilingType, filing_date: NaiveDate, content: &[u8]) -> Self {
        Self {
            id: id.to_string(),
            filing_type,
            filing_date,
            url: None,
            content: content.to_vec(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }
}

/// Where a text unit came from in the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Paragraph,
    TableRow,
    ListItem,
    Block,
    PlainText,
}

/// A contiguous span of document text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextUnit {
    pub text: String,
    pub kind: UnitKind,
}

/// Provisional tag assigned during selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextTag {
    Transaction,
    Cumulative,
    Pricing,
    Unknown,
}

/// A span containing an asset keyword and at least one numeric token.
#[derive(Debug, Clone)]
pub struct CandidateParagraph {
    /// Position of the unit within the document.
    pub index: usize,
    pub text: String,
    pub kind: UnitKind,
    pub numeric_tokens: Vec<String>,
    pub context: ContextTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationLabel {
    IndividualTransaction,
    CumulativeTotal,
    FinancingActivity,
    FutureIntent,
    HoldingsSnapshot,
    Unclassified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Pattern,
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Purchase,
    Sale,
}

/// One dated purchase or sale of the treasury asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTransaction {
    pub date: Option<NaiveDate>,
    pub kind: TransactionKind,
    pub asset_amount: Option<f64>,
    pub fiat_amount: Option<f64>,
    pub unit_price: Option<f64>,
    /// Total holdings reported right after this event, when disclosed.
    pub holdings_after: Option<f64>,
    pub source_excerpt: String,
    pub method: ExtractionMethod,
    pub confidence: f32,
}

/// Where a share count was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareSource {
    BalanceSheet,
    CoverPage,
    Note,
    Table,
}

impl ShareSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareSource::BalanceSheet => "balance_sheet",
            ShareSource::CoverPage => "cover_page",
            ShareSource::Note => "note",
            ShareSource::Table => "table",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharesOutstandingRecord {
    pub as_of: NaiveDate,
    pub common: u64,
    pub preferred: Option<u64>,
    pub total: u64,
    pub source: ShareSource,
    pub source_excerpt: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Parse,
    Model,
}

/// Non-fatal problem recorded against a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub stage: ProcessingStage,
    pub message: String,
}

impl ProcessingError {
    pub fn new(stage: ProcessingStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Aggregate counters. Extraction misses and plausibility rejections are
/// only visible here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub units: usize,
    pub candidates: usize,
    pub individual: usize,
    pub cumulative: usize,
    pub financing: usize,
    pub future_intent: usize,
    pub holdings: usize,
    pub unclassified: usize,
    pub pattern_misses: usize,
    pub rejected: usize,
    pub model_calls: usize,
    pub model_records: usize,
    pub duplicates_merged: usize,
    pub share_candidates: usize,
}

impl ExtractionStats {
    pub fn record_label(&mut self, label: ClassificationLabel) {
        match label {
            ClassificationLabel::IndividualTransaction => self.individual += 1,
            ClassificationLabel::CumulativeTotal => self.cumulative += 1,
            ClassificationLabel::FinancingActivity => self.financing += 1,
            ClassificationLabel::FutureIntent => self.future_intent += 1,
            ClassificationLabel::HoldingsSnapshot => self.holdings += 1,
            ClassificationLabel::Unclassified => self.unclassified += 1,
        }
    }
}

/// Per-document output handed to the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_id: String,
    pub filing_type: FilingType,
    pub filing_date: NaiveDate,
    pub transactions: Vec<ExtractedTransaction>,
    pub shares_outstanding: Option<SharesOutstandingRecord>,
    pub errors: Vec<ProcessingError>,
    pub stats: ExtractionStats,
}

impl ExtractionResult {
    /// Empty result for a document; the starting point of every run.
    pub fn empty(doc: &RawDocument) -> Self {
        Self {
            document_id: doc.id.clone(),
            filing_type: doc.filing_type,
            filing_date: doc.filing_date,
            transactions: Vec::new(),
            shares_outstanding: None,
            errors: Vec::new(),
            stats: ExtractionStats::default(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
