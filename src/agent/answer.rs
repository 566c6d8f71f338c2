use serde_json::{Map, Value};

/// Fields every legal structured response carries.
pub const STRUCTURED_FIELDS: [&str; 8] = [
    "answer",
    "legal_basis",
    "next_steps",
    "documents_needed",
    "resources",
    "alternatives",
    "urgency",
    "disclaimer",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnswer {
    pub text: String,
    /// `None` when the reply was not the expected JSON envelope.
    pub structured: Option<Value>,
}

/// Reads the `{"text", "structured_response"}` envelope out of a model
/// reply. Code fences and prose around the object are tolerated; anything
/// unparsable is returned verbatim as text.
pub fn parse_answer(raw: &str) -> ParsedAnswer {
    let fallback = ParsedAnswer {
        text: raw.trim().to_string(),
        structured: None,
    };

    let Some(Value::Object(envelope)) = parse_json_from_text(raw) else {
        return fallback;
    };
    let Some(text) = envelope.get("text").and_then(Value::as_str) else {
        return fallback;
    };

    let structured = match envelope.get("structured_response") {
        Some(Value::Object(fields)) => Value::Object(complete_fields(fields)),
        _ => Value::Object(Map::new()),
    };

    ParsedAnswer {
        text: text.trim().to_string(),
        structured: Some(structured),
    }
}

/// A non-empty structured response gets every missing field as "".
fn complete_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    let mut completed = fields.clone();
    if completed.is_empty() {
        return completed;
    }
    for field in STRUCTURED_FIELDS {
        completed
            .entry(field.to_string())
            .or_insert_with(|| Value::String(String::new()));
    }
    completed
}

fn parse_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if start < end {
                if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                    return Some(v);
                }
            }
        }
    }

    None
}
