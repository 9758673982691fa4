use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub sku: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub context_ids: Vec<String>,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl AnalysisRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sku.trim().is_empty() {
            return Err(ValidationError("sku must not be empty".to_string()));
        }
        if self.question.trim().is_empty() {
            return Err(ValidationError("question must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Structured answer agreed with the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub answer: String,
    pub attributes: Map<String, Value>,
    pub compliance: BTreeMap<String, ComplianceValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<Grounding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grounding {
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub visual_refs: Vec<String>,
}

/// Outcome of one compliance rule: a flag, a short verdict string, or
/// `{"pass": bool, "reason": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComplianceValue {
    Flag(bool),
    Note(String),
    Verdict {
        pass: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ComplianceValue {
    /// `None` when a free-text note carries no pass/fail verdict.
    pub fn passed(&self) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(*flag),
            Self::Verdict { pass, .. } => Some(*pass),
            Self::Note(note) => match note.trim().to_lowercase().as_str() {
                "pass" | "passed" | "true" | "yes" | "compliant" => Some(true),
                "fail" | "failed" | "false" | "no" | "non-compliant" => Some(false),
                _ => None,
            },
        }
    }
}

// Greedy, so backticks inside the JSON do not end the block early.
static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*\n(.*)```").expect("fence pattern compiles")
});

/// Body of the outermost markdown code fence, if the reply has one.
fn fenced_json(text: &str) -> Option<&str> {
    JSON_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Validate the model's reply text against the response schema.
pub fn parse_reply(text: &str) -> Result<AnalysisResponse, ModelError> {
    let body = text.trim();
    if body.is_empty() {
        return Err(ModelError::invalid_reply("empty reply"));
    }

    if let Ok(response) = serde_json::from_str(body) {
        return Ok(response);
    }

    let json = fenced_json(body).unwrap_or(body);
    serde_json::from_str(json).map_err(|e| ModelError::invalid_reply(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_json_reply() {
        let reply = r#"{"answer":"yes","attributes":{},"compliance":{"brand_rule_X":true}}"#;
        let parsed = parse_reply(reply).unwrap();

        assert_eq!(parsed.answer, "yes");
        assert_eq!(parsed.compliance["brand_rule_X"], ComplianceValue::Flag(true));
        assert_eq!(
            serde_json::to_value(&parsed).unwrap(),
            serde_json::from_str::<Value>(reply).unwrap()
        );
    }

    #[test]
    fn parses_fenced_reply_with_verdicts() {
        let reply = "Here you go:\n```json\n{\n  \"answer\": \"Insufficient evidence.\",\n  \"attributes\": {\"color\": {\"value\": \"brown\", \"source\": \"image\"}},\n  \"compliance\": {\"R-103\": {\"pass\": false, \"reason\": \"orthopedic claim\"}},\n  \"grounding\": {\"citations\": [\"R-103\"], \"visual_refs\": []}\n}\n```\n";
        let parsed = parse_reply(reply).unwrap();

        assert_eq!(parsed.attributes["color"]["value"], json!("brown"));
        assert_eq!(parsed.compliance["R-103"].passed(), Some(false));
        assert_eq!(parsed.grounding.unwrap().citations, vec!["R-103"]);
    }

    #[test]
    fn fenced_reply_may_contain_backticks() {
        let reply = "```json\n{\"answer\":\"Run ``` to format\",\"attributes\":{},\"compliance\":{}}\n```";
        let parsed = parse_reply(reply).unwrap();

        assert_eq!(parsed.answer, "Run ``` to format");
    }

    #[test]
    fn bare_json_with_backticks_skips_fence_stripping() {
        let reply = r#"{"answer":"Wrap code in ```json fences```","attributes":{},"compliance":{}}"#;
        let parsed = parse_reply(reply).unwrap();

        assert_eq!(parsed.answer, "Wrap code in ```json fences```");
    }

    #[test]
    fn empty_reply_is_invalid() {
        assert!(matches!(parse_reply("  \n"), Err(ModelError::InvalidReply { .. })));
    }

    #[test]
    fn non_json_reply_is_invalid() {
        let err = parse_reply("I think these shoes look great!").unwrap_err();
        assert!(matches!(err, ModelError::InvalidReply { .. }));
    }

    #[test]
    fn missing_keys_are_invalid() {
        let err = parse_reply(r#"{"answer":"yes"}"#).unwrap_err();
        assert!(matches!(err, ModelError::InvalidReply { .. }));
    }

    #[test]
    fn ill_typed_compliance_is_invalid() {
        let err = parse_reply(r#"{"answer":"yes","attributes":{},"compliance":{"R-1":3}}"#)
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidReply { .. }));
    }

    #[test]
    fn note_verdicts() {
        assert_eq!(ComplianceValue::Note("FAIL".into()).passed(), Some(false));
        assert_eq!(ComplianceValue::Note("pass".into()).passed(), Some(true));
        assert_eq!(ComplianceValue::Note("needs review".into()).passed(), None);
    }

    #[test]
    fn validates_request() {
        let mut request = AnalysisRequest {
            sku: "SH-001".into(),
            question: "Is it leather?".into(),
            context_ids: vec![],
        };
        assert!(request.validate().is_ok());

        request.question = "  ".into();
        assert!(request.validate().is_err());

        request.question = "Is it leather?".into();
        request.sku = String::new();
        assert!(request.validate().is_err());
    }
}
