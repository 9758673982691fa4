use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use vision::{AnalysisRequest, AnalysisResponse};

/// Context id that names the spec catalog itself, which every request already uses.
pub const SPEC_CATALOG_CONTEXT: &str = "spec_catalog";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSample")]
pub struct EvalSample {
    pub sku: String,
    pub question: String,
    pub context_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect: Option<Expectation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    /// Rule the model must fail for the claim being probed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbid_claim_rule: Option<String>,
    /// Any well-formed answer passes, including "insufficient evidence".
    #[serde(default)]
    pub allow_insufficient: bool,
}

// Samples carry the SKU either at the top level or under `metadata`.
#[derive(Deserialize)]
struct RawSample {
    sku: Option<String>,
    metadata: Option<SampleMetadata>,
    question: String,
    #[serde(default)]
    context_ids: Vec<String>,
    expected_answer: Option<String>,
    expect: Option<Expectation>,
}

#[derive(Deserialize)]
struct SampleMetadata {
    sku: Option<String>,
}

impl TryFrom<RawSample> for EvalSample {
    type Error = String;

    fn try_from(raw: RawSample) -> Result<Self, Self::Error> {
        let sku = raw
            .sku
            .or_else(|| raw.metadata.and_then(|m| m.sku))
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| "sample has no sku".to_string())?;

        Ok(Self {
            sku,
            question: raw.question,
            context_ids: raw.context_ids,
            expected_answer: raw.expected_answer,
            expect: raw.expect,
        })
    }
}

impl EvalSample {
    pub fn to_request(&self) -> AnalysisRequest {
        AnalysisRequest {
            sku: self.sku.clone(),
            question: self.question.clone(),
            context_ids: self
                .context_ids
                .iter()
                .filter(|id| id.as_str() != SPEC_CATALOG_CONTEXT)
                .cloned()
                .collect(),
        }
    }
}

/// Parse line-delimited samples; blank lines are skipped.
pub fn parse_samples(jsonl: &str) -> Result<Vec<EvalSample>> {
    jsonl
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid sample on line {}", i + 1))
        })
        .collect()
}

pub fn load_samples(path: &Path) -> Result<Vec<EvalSample>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read samples from {}", path.display()))?;
    parse_samples(&content)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// `None` when no criterion applies to the sample.
    pub pass: Option<bool>,
    pub reason: String,
}

/// Lowercase, collapse whitespace, drop trailing punctuation.
pub fn normalize_answer(answer: &str) -> String {
    answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_end_matches(['.', '!'])
        .to_string()
}

/// Score one response against the sample's ground truth.
pub fn evaluate(sample: &EvalSample, response: &AnalysisResponse) -> Verdict {
    if let Some(expected) = &sample.expected_answer {
        let pass = normalize_answer(expected) == normalize_answer(&response.answer);
        let reason = if pass {
            "Answer matches the expected answer.".to_string()
        } else {
            format!("Expected {:?}, got {:?}.", expected, response.answer)
        };
        return Verdict {
            pass: Some(pass),
            reason,
        };
    }

    let expect = sample.expect.clone().unwrap_or_default();

    if let Some(rule_id) = &expect.forbid_claim_rule {
        let failed = response
            .compliance
            .get(rule_id)
            .and_then(|v| v.passed())
            == Some(false);
        return if failed {
            Verdict {
                pass: Some(true),
                reason: format!("Correctly failed compliance rule {}.", rule_id),
            }
        } else {
            Verdict {
                pass: Some(false),
                reason: format!(
                    "Expected to fail compliance rule {}, but it passed or was not found.",
                    rule_id
                ),
            }
        };
    }

    if expect.allow_insufficient {
        let answered = !response.answer.trim().is_empty();
        return Verdict {
            pass: Some(answered),
            reason: if answered {
                "API returned a valid answer.".to_string()
            } else {
                "API failed to return an answer.".to_string()
            },
        };
    }

    Verdict {
        pass: None,
        reason: "No evaluation criteria matched for this sample.".to_string(),
    }
}
