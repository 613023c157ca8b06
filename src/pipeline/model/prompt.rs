use crate::pipeline::extraction::types::RawDocument;

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"
You are a financial disclosure extraction assistant. Your ONLY role is to find
individual treasury transactions (purchases or sales of the named digital asset)
that are explicitly stated in regulatory filing text.

RULES:
1. Extract ONLY transactions explicitly stated in the text.
2. NEVER compute, estimate or infer amounts that are not written.
3. NEVER report a cumulative total, a period aggregate or a holdings balance as a transaction.
4. NEVER report financing activity (note offerings, loans, equity raises) as a transaction.
5. NEVER report plans or intentions as a transaction.
6. If a value is missing, output null for that field.
7. Output MUST be a single JSON object and nothing else.
"#;

/// The individual-vs-cumulative distinction, with worked examples for `asset`.
fn transaction_guide(asset: &str) -> String {
    format!(
        r#"INDIVIDUAL vs CUMULATIVE - read carefully.

The asset is {asset}. Report quantities of {asset} only.

An INDIVIDUAL transaction is one purchase or sale on one stated date.
  Example: "On August 11, 2020, the Company purchased 21,454 {asset} for $250.0 million."
  -> one transaction: asset_amount 21454, fiat_amount 250000000, date 2020-08-11, type "individual".
  Example: "On February 24, 2021, we acquired 19,452 {asset} at an average price of $52,765 each."
  -> one transaction: asset_amount 19452, unit_price 52765, date 2021-02-24, type "individual".

A CUMULATIVE total spans several purchases over a period. It is NOT a transaction.
  Example: "During the period between November 1, 2021 and November 29, 2021, the Company purchased 7,002 {asset} for $414.4 million."
  -> no transaction. If you mention it at all, set type "cumulative".
  Example: "During the quarter, we acquired an aggregate of 8,957 {asset}."
  -> no transaction, type "cumulative".

A HOLDINGS balance is NOT a transaction.
  Example: "As of December 31, 2023, the Company held 189,150 {asset}."
  -> no transaction.

FINANCING is NOT a transaction, even when the proceeds were later used to buy {asset}.
  Example: "We issued $650 million aggregate principal amount of convertible senior notes."
  -> no transaction.
"#
    )
}

/// Build the fallback extraction prompt for one document's filtered text.
pub fn build_extraction_prompt(doc: &RawDocument, asset: &str, filtered_text: &str) -> String {
    format!(
        r#"Filing: {id}
Filing type: {filing_type}
Filing date: {filing_date}

{guide}
<document>
{filtered_text}
</document>

Return exactly this JSON structure:
{{
  "transactions": [
    {{
      "asset_amount": 0.0,
      "fiat_amount": 0.0,
      "unit_price": 0.0,
      "type": "individual | cumulative",
      "kind": "purchase | sale",
      "date": "YYYY-MM-DD or null",
      "confidence": 0.0,
      "rationale": "why this is an individual transaction",
      "source_excerpt": "the exact sentence the values came from"
    }}
  ],
  "analysis": "short summary of what the text discloses",
  "confidence": 0.0,
  "reasoning": "why each candidate statement was included or excluded"
}}

If no individual transaction is stated, return an empty "transactions" array."#,
        id = doc.id,
        filing_type = doc.filing_type.as_str(),
        filing_date = doc.filing_date.format("%Y-%m-%d"),
        guide = transaction_guide(asset),
    )
}
