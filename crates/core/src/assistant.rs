use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```(?:json)?\s*\r?\n?(.*?)```").expect("fenced json regex should compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLocation {
    pub absolute_file_path: String,
    pub line_range: LineRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeReviewFinding {
    pub title: String,
    pub body: String,
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    pub code_location: CodeLocation,
}

/// Findings emitted by a review-mode agent reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeReviewOutput {
    pub findings: Vec<CodeReviewFinding>,
    #[serde(default)]
    pub overall_correctness: Option<String>,
    #[serde(default)]
    pub overall_explanation: Option<String>,
    #[serde(default)]
    pub overall_confidence_score: Option<f64>,
}

/// Partial JSON or fenced blocks look broken while streaming.
pub fn should_hide_while_streaming(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with("```")
}

fn is_object_text(text: &str) -> bool {
    text.starts_with('{') && text.ends_with('}')
}

pub fn looks_like_json_output(text: &str) -> bool {
    let trimmed = text.trim();
    if is_object_text(trimmed) {
        return true;
    }
    FENCED_JSON
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .is_some_and(|inner| is_object_text(inner.as_str().trim()))
}

fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if is_object_text(trimmed) {
        return Some(trimmed);
    }
    if let Some(inner) = FENCED_JSON.captures(trimmed).and_then(|caps| caps.get(1)) {
        let inner = inner.as_str().trim();
        if is_object_text(inner) {
            return Some(inner);
        }
    }

    // Prose around the object: shrink from the right until something parses.
    let start = trimmed.find('{')?;
    let mut end = trimmed.rfind('}')?;
    while end > start {
        let candidate = trimmed[start..=end].trim();
        if serde_json::from_str::<Value>(candidate).is_ok() {
            return Some(candidate);
        }
        end = trimmed[..end].rfind('}')?;
    }
    None
}

fn as_integer(value: &Value) -> Option<i64> {
    match value.as_i64() {
        Some(n) => Some(n),
        None => value.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64),
    }
}

fn parse_finding(value: &Value) -> Option<CodeReviewFinding> {
    let title = value.get("title")?.as_str()?;
    let body = value.get("body")?.as_str()?;
    let confidence_score = value.get("confidence_score")?.as_f64()?;

    let priority = match value.get("priority") {
        None | Some(Value::Null) => None,
        Some(p) => Some(as_integer(p)?),
    };

    let location = value.get("code_location")?;
    let absolute_file_path = location.get("absolute_file_path")?.as_str()?;
    let range = location.get("line_range")?;
    let start = as_integer(range.get("start")?)?;
    let end = as_integer(range.get("end")?)?;

    Some(CodeReviewFinding {
        title: title.to_string(),
        body: body.to_string(),
        confidence_score,
        priority,
        code_location: CodeLocation {
            absolute_file_path: absolute_file_path.to_string(),
            line_range: LineRange { start, end },
        },
    })
}

/// Parse code-review findings out of a completed assistant message.
///
/// Any malformed finding rejects the whole output. Overall fields are kept
/// only when well-typed.
pub fn parse_code_review_output(text: &str) -> Option<CodeReviewOutput> {
    if !looks_like_json_output(text) {
        return None;
    }
    let parsed: Value = serde_json::from_str(extract_json_object(text)?).ok()?;
    let findings = parsed
        .get("findings")?
        .as_array()?
        .iter()
        .map(parse_finding)
        .collect::<Option<Vec<_>>>()?;

    let overall_correctness = parsed
        .get("overall_correctness")
        .and_then(Value::as_str)
        .filter(|v| matches!(*v, "patch is correct" | "patch is incorrect"))
        .map(str::to_string);

    Some(CodeReviewOutput {
        findings,
        overall_correctness,
        overall_explanation: parsed
            .get("overall_explanation")
            .and_then(Value::as_str)
            .map(str::to_string),
        overall_confidence_score: parsed.get("overall_confidence_score").and_then(Value::as_f64),
    })
}

/// Markdown heading at the top of `text` (`# h`, `**h**` or setext) and the remaining body.
pub fn extract_heading(text: &str) -> (Option<String>, String) {
    let lines: Vec<&str> = text.split('\n').collect();
    let first_idx = lines.iter().position(|l| !l.trim().is_empty()).unwrap_or(lines.len());
    let first = lines.get(first_idx).map(|l| l.trim()).unwrap_or("");
    let second = lines.get(first_idx + 1).map(|l| l.trim()).unwrap_or("");
    let rest = |skip: usize| lines.iter().skip(first_idx + skip).copied().collect::<Vec<_>>().join("\n").trim().to_string();
    let non_empty = |h: &str| Some(h.to_string()).filter(|h| !h.is_empty());

    if first.starts_with('#') {
        let heading = first.trim_start_matches('#').trim();
        return (non_empty(heading), rest(1));
    }
    if first.len() > 4 && first.starts_with("**") && first.ends_with("**") {
        let heading = first[2..first.len() - 2].trim();
        return (non_empty(heading), rest(1));
    }
    let is_underline = |l: &str| !l.is_empty() && (l.chars().all(|c| c == '=') || l.chars().all(|c| c == '-'));
    if !first.is_empty() && is_underline(second) {
        return (non_empty(first), rest(2));
    }
    (None, text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVIEW: &str = r#"{
        "findings": [{
            "title": "[P1] Off by one",
            "body": "Loop skips the last element.",
            "confidence_score": 0.8,
            "priority": 1,
            "code_location": {
                "absolute_file_path": "/repo/src/lib.rs",
                "line_range": { "start": 10, "end": 12 }
            }
        }],
        "overall_correctness": "patch is incorrect",
        "overall_explanation": 42,
        "overall_confidence_score": 0.7
    }"#;

    #[test]
    fn hides_partial_structured_output() {
        assert!(should_hide_while_streaming("  {\"find"));
        assert!(should_hide_while_streaming("```json\n{"));
        assert!(!should_hide_while_streaming("Here is the plan"));
    }

    #[test]
    fn parses_bare_review_object() {
        let output = parse_code_review_output(REVIEW).unwrap();
        assert_eq!(output.findings.len(), 1);
        assert_eq!(output.findings[0].priority, Some(1));
        assert_eq!(output.findings[0].code_location.line_range.end, 12);
        assert_eq!(output.overall_correctness.as_deref(), Some("patch is incorrect"));
        assert_eq!(output.overall_explanation, None);
    }

    #[test]
    fn parses_fenced_review_object() {
        let text = format!("```json\n{REVIEW}\n```");
        assert!(looks_like_json_output(&text));
        assert!(parse_code_review_output(&text).is_some());
    }

    #[test]
    fn malformed_finding_rejects_everything() {
        let text = r#"{"findings":[{"title":"x","body":"y","confidence_score":"high","code_location":{}}]}"#;
        assert!(parse_code_review_output(text).is_none());
        assert!(parse_code_review_output("plain prose").is_none());
        assert!(parse_code_review_output(r#"{"summary": "no findings key"}"#).is_none());
    }

    #[test]
    fn extracts_headings() {
        assert_eq!(
            extract_heading("\n## Planning\nLook at files"),
            (Some("Planning".to_string()), "Look at files".to_string())
        );
        assert_eq!(
            extract_heading("**Scanning crates**\n\nbody"),
            (Some("Scanning crates".to_string()), "body".to_string())
        );
        assert_eq!(
            extract_heading("Title\n=====\ntext"),
            (Some("Title".to_string()), "text".to_string())
        );
        assert_eq!(extract_heading("no heading"), (None, "no heading".to_string()));
    }
}
