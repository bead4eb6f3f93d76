//! Validation of model payloads against the test case wire schema.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use qagent_core::error::{Error, Result};
use qagent_core::types::{Category, Diagnostic, IssueKind, TestCase, NOT_SPECIFIED};

static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("fence regex"));

/// Items that passed validation plus one issue per dropped item.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub cases: Vec<TestCase>,
    pub issues: Vec<Diagnostic>,
}

/// Strips code fences and returns the text between the first `[` and the last `]`.
pub fn extract_array(raw: &str) -> Option<String> {
    let cleaned = FENCE.replace_all(raw, "");
    let start = cleaned.find('[')?;
    let end = cleaned.rfind(']')?;
    (end > start).then(|| cleaned[start..=end].to_string())
}

/// Parses a model response into test cases.
///
/// Fails with `Error::SchemaValidation` only when the response holds no JSON
/// array at all; malformed items are dropped and reported individually.
pub fn parse_payload(raw: &str) -> Result<ParsedBatch> {
    let body = extract_array(raw).ok_or_else(|| Error::SchemaValidation("response contains no JSON array".into()))?;
    let value: Value = serde_json::from_str(&body)
        .map_err(|e| Error::SchemaValidation(format!("response array is not valid JSON: {e}")))?;
    let Value::Array(items) = value else {
        return Err(Error::SchemaValidation("response is not a JSON array".into()));
    };

    let mut batch = ParsedBatch::default();
    for (i, item) in items.iter().enumerate() {
        match parse_item(item) {
            Ok(case) => batch.cases.push(case),
            Err(reason) => {
                tracing::debug!(item = i + 1, %reason, "dropping malformed test case");
                batch
                    .issues
                    .push(Diagnostic::new(IssueKind::SchemaValidation, reason).with_subject(format!("item {}", i + 1)));
            }
        }
    }
    Ok(batch)
}

/// Looks a key up exactly, then ignoring case, underscores and spaces.
fn lookup<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let squash = |s: &str| s.chars().filter(|c| *c != '_' && *c != ' ').collect::<String>().to_lowercase();
    let wanted = squash(key);
    obj.get(key).or_else(|| obj.iter().find(|(k, _)| squash(k) == wanted).map(|(_, v)| v))
}

fn required_text(obj: &Map<String, Value>, key: &str) -> std::result::Result<String, String> {
    match lookup(obj, key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::String(_) | Value::Null) | None => Err(format!("missing {key}")),
        Some(_) => Err(format!("{key} must be a string")),
    }
}

fn optional_text(obj: &Map<String, Value>, key: &str) -> std::result::Result<Option<String>, String> {
    match lookup(obj, key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Array(items)) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if parts.len() == items.len() {
                Ok(Some(parts.join(", ")))
            } else {
                Err(format!("{key} must be a string"))
            }
        }
        Some(_) => Err(format!("{key} must be a string")),
    }
}

fn steps(obj: &Map<String, Value>) -> std::result::Result<Vec<String>, String> {
    let steps: Vec<String> = match lookup(obj, "Steps") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::trim).map(str::to_string).ok_or_else(|| "Steps must be strings".to_string()))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        Some(Value::String(s)) => s.lines().map(str::trim).map(str::to_string).collect(),
        _ => return Err("missing Steps".into()),
    };
    let steps: Vec<String> = steps.into_iter().filter(|s| !s.is_empty()).collect();
    if steps.is_empty() {
        return Err("Steps is empty".into());
    }
    Ok(steps)
}

fn parse_item(item: &Value) -> std::result::Result<TestCase, String> {
    let obj = item.as_object().ok_or_else(|| "item is not an object".to_string())?;
    let kind = required_text(obj, "Type")?;
    let category = Category::parse(&kind).ok_or_else(|| format!("unknown Type {kind:?}"))?;
    Ok(TestCase {
        id: optional_text(obj, "Test_ID")?.unwrap_or_default(),
        feature: required_text(obj, "Feature")?,
        scenario: required_text(obj, "Test_Scenario")?,
        steps: steps(obj)?,
        expected_result: required_text(obj, "Expected_Result")?,
        grounded_in: optional_text(obj, "Grounded_In")?
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        category,
        notes: optional_text(obj, "Notes")?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"{"Test_ID":"TC001","Feature":"Discount code","Test_Scenario":"Apply SAVE10",
        "Steps":["Enter SAVE10","Click apply"],"Expected_Result":"$10.00 off","Grounded_In":"rules.md",
        "Type":"Positive","Notes":""}"#;

    #[test]
    fn fenced_payload_is_unwrapped() {
        let raw = format!("Here you go:\n```json\n[{GOOD}]\n```\nThanks");
        let batch = parse_payload(&raw).expect("parse");
        assert_eq!(batch.cases.len(), 1);
        assert!(batch.issues.is_empty());
        assert_eq!(batch.cases[0].steps, vec!["Enter SAVE10", "Click apply"]);
        assert_eq!(batch.cases[0].category, Category::Positive);
    }

    #[test]
    fn malformed_item_is_dropped_not_fatal() {
        let raw = format!(r#"[{GOOD}, {{"Feature":"x"}}, 42, {{"Feature":"y","Test_Scenario":"z","Steps":"a\nb","Expected_Result":"r","Type":"Sideways"}}]"#);
        let batch = parse_payload(&raw).expect("parse");
        assert_eq!(batch.cases.len(), 1);
        assert_eq!(batch.issues.len(), 3);
        assert!(batch.issues.iter().all(|d| d.kind == IssueKind::SchemaValidation));
        assert_eq!(batch.issues[2].subject.as_deref(), Some("item 4"));
    }

    #[test]
    fn loose_keys_and_missing_citation() {
        let raw = r#"[{"feature":"Checkout","test_scenario":"Pay","steps":["Pay"],"expected_result":"Paid","type":"edge"}]"#;
        let batch = parse_payload(raw).expect("parse");
        assert_eq!(batch.cases[0].grounded_in, NOT_SPECIFIED);
        assert_eq!(batch.cases[0].category, Category::Edge);
    }

    #[test]
    fn payload_without_array_is_a_schema_error() {
        assert!(matches!(parse_payload("I cannot help with that."), Err(Error::SchemaValidation(_))));
        assert!(matches!(parse_payload("[not json]"), Err(Error::SchemaValidation(_))));
    }
}
