use catalog::{ContextDocument, ImageRef, ProductSpec};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Prompt text plus the image it refers to, ready for the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedPayload {
    pub text: String,
    pub image: ImageRef,
    /// Hex SHA-256 of text and image, stable across identical inputs.
    pub fingerprint: String,
}

/// Compact, citable summary of everything known about the product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextCard {
    pub product_attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_voice: Option<Value>,
    pub rules: Vec<Rule>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub documents: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub id: Value,
    pub text: Value,
    pub mandatory: bool,
}

pub fn build_context_card(spec: &ProductSpec, contexts: &[ContextDocument]) -> ContextCard {
    let mut card = ContextCard {
        product_attributes: spec.fields.clone(),
        brand_voice: None,
        rules: Vec::new(),
        documents: BTreeMap::new(),
    };

    for doc in contexts {
        let mut recognized = false;

        if let Some(voice) = doc.content.get("brand_voice") {
            card.brand_voice = Some(voice.clone());
            recognized = true;
        }

        if let Some(rules) = doc.content.get("rules").and_then(Value::as_array) {
            recognized = true;
            card.rules.extend(rules.iter().map(|rule| Rule {
                id: rule.get("id").cloned().unwrap_or(Value::Null),
                text: rule.get("text").cloned().unwrap_or(Value::Null),
                mandatory: rule.get("mandatory").and_then(Value::as_bool).unwrap_or(false),
            }));
        }

        if !recognized {
            card.documents.insert(doc.id.clone(), doc.content.clone());
        }
    }

    card
}

/// Merge spec fields, context documents and the question into one payload.
pub fn compose(
    spec: &ProductSpec,
    contexts: &[ContextDocument],
    question: &str,
    image: &ImageRef,
) -> ComposedPayload {
    let mut card = build_context_card(spec, contexts);
    // The image travels as its own part.
    card.product_attributes.remove(&image.field);
    // A card of strings, maps and arrays always serializes.
    let card_json = serde_json::to_string_pretty(&card).unwrap_or_default();
    let text = build_analysis_prompt(&spec.sku, &card_json, question.trim());

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"\n");
    hasher.update(image.uri.as_bytes());
    hasher.update(image.mime_type.as_bytes());
    let fingerprint = hex::encode(hasher.finalize());

    ComposedPayload {
        text,
        image: image.clone(),
        fingerprint,
    }
}

pub fn build_analysis_prompt(sku: &str, context_card: &str, question: &str) -> String {
    format!(
        r#"You are an expert e-commerce analyst. Analyze the attached product image of SKU {sku} together with its context card to answer the user's question, extract attributes, and check policy compliance.

CONTEXT CARD:
```json
{context_card}
```

USER QUESTION: "{question}"

TASKS:
1. Answer the question using both the image and the context card. If the image gives insufficient evidence, say so clearly and cite rule R-102 if applicable.
2. Extract the attributes color, closure, style and outsole_pattern from the image and reconcile them with the spec fields in the context card.
3. Evaluate every rule in the context card and give each a pass or fail with a brief reason. If the question probes a claim area governed by a rule (orthopedic support, water resistance, and similar), that rule MUST fail, explaining that the claim cannot be made.

OUTPUT:
Respond with a single valid JSON object and nothing else, using exactly this schema:
{{
  "answer": "your answer to the question",
  "grounding": {{
    "citations": ["rule ids or spec fields supporting the answer, e.g. R-101, spec:material"],
    "visual_refs": ["brief descriptions of visual evidence from the image"]
  }},
  "attributes": {{
    "color": {{"value": "...", "source": "image|spec"}},
    "closure": {{"value": "...", "source": "image|spec"}},
    "style": {{"value": "...", "source": "image|spec"}},
    "outsole_pattern": {{"value": "...", "source": "image|spec"}}
  }},
  "compliance": {{
    "<rule id>": {{"pass": true, "reason": "justification"}}
  }}
}}"#
    )
}
