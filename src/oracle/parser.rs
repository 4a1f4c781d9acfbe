//! Parser for the oracle's weekly plan output

use crate::error::OracleError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// One scheduled task of a proposed plan, flattened out of its week
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposedPlanItem {
    pub week: u32,
    pub milestone: String,
    pub day: u32,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
struct RawWeek {
    #[serde(deserialize_with = "lenient_u32")]
    week: u32,
    #[serde(default)]
    milestone: String,
    #[serde(default)]
    days: Vec<Value>,
}

#[derive(Deserialize)]
struct RawDay {
    #[serde(deserialize_with = "lenient_u32")]
    day: u32,
    #[serde(alias = "title")]
    task: String,
    #[serde(default)]
    description: Option<String>,
}

/// Accept `3` as well as `"3"`
fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u32),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Parse raw oracle output into plan items, preserving the oracle's order.
///
/// Accepts a bare week array or an object with a `plan` array, optionally
/// wrapped in Claude's `{"result": "..."}` envelope or a markdown code fence.
/// Unreadable weeks and days are skipped; a plan with no usable items is
/// [`OracleError::EmptyPlan`].
pub fn parse_plan(raw: &str) -> Result<Vec<ProposedPlanItem>, OracleError> {
    // Claude wraps result in {"result": "...", ...} JSON
    #[derive(Deserialize)]
    struct ClaudeOutput {
        result: String,
    }

    let body = match serde_json::from_str::<ClaudeOutput>(raw) {
        Ok(claude_out) => claude_out.result,
        Err(_) => raw.to_string(),
    };

    let json_str = extract_json(&body).ok_or_else(|| {
        debug!(
            "No JSON found in oracle output: {}...",
            body.chars().take(200).collect::<String>()
        );
        OracleError::Malformed("no JSON plan found in oracle output".to_string())
    })?;

    let value: Value = serde_json::from_str(&json_str)
        .map_err(|e| OracleError::Malformed(format!("invalid JSON: {}", e)))?;

    let weeks = match value {
        Value::Array(weeks) => weeks,
        Value::Object(mut map) => match map.remove("plan") {
            Some(Value::Array(weeks)) => weeks,
            _ => {
                return Err(OracleError::Malformed(
                    "expected a JSON array or an object with a `plan` array".to_string(),
                ))
            }
        },
        _ => {
            return Err(OracleError::Malformed(
                "expected a JSON array of weeks".to_string(),
            ))
        }
    };

    let mut items = Vec::new();
    for week_value in weeks {
        let week: RawWeek = match serde_json::from_value(week_value) {
            Ok(w) => w,
            Err(e) => {
                debug!("Skipping unreadable week: {}", e);
                continue;
            }
        };

        for day_value in week.days {
            let day: RawDay = match serde_json::from_value(day_value) {
                Ok(d) => d,
                Err(e) => {
                    debug!("Skipping unreadable day in week {}: {}", week.week, e);
                    continue;
                }
            };
            let title = day.task.trim();
            if title.is_empty() {
                continue;
            }
            items.push(ProposedPlanItem {
                week: week.week,
                milestone: week.milestone.clone(),
                day: day.day,
                title: title.to_string(),
                description: day.description.filter(|d| !d.trim().is_empty()),
            });
        }
    }

    if items.is_empty() {
        return Err(OracleError::EmptyPlan);
    }

    Ok(items)
}

/// Extract a JSON array or object from a string that might contain markdown code blocks
fn extract_json(s: &str) -> Option<String> {
    let trimmed = s.trim();

    // First try: the whole string is valid JSON
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(trimmed).is_ok()
    {
        return Some(trimmed.to_string());
    }

    // Second try: extract from markdown code block
    let re = regex::Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok()?;
    for cap in re.captures_iter(s) {
        let potential_json = cap.get(1)?.as_str().trim();
        if serde_json::from_str::<Value>(potential_json).is_ok() {
            return Some(potential_json.to_string());
        }
    }

    // Third try: the first balanced [...] or {...} span
    let start = s.find(['[', '{'])?;
    let (open, close) = if s[start..].starts_with('[') {
        ('[', ']')
    } else {
        ('{', '}')
    };

    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    let potential_json = &s[start..end?];
    if serde_json::from_str::<Value>(potential_json).is_ok() {
        return Some(potential_json.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUITAR: &str = r#"[
        {"week": 1, "milestone": "Basics", "days": [
            {"day": 1, "task": "Practice basic chords"},
            {"day": 2, "task": "Learn music theory"}
        ]},
        {"week": 2, "milestone": "Songs", "days": [
            {"day": 1, "task": "Play a simple song", "description": "Pick anything with G, C, D"}
        ]}
    ]"#;

    #[test]
    fn test_parse_bare_array_in_order() {
        let items = parse_plan(GUITAR).unwrap();
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Practice basic chords", "Learn music theory", "Play a simple song"]
        );
        assert_eq!(items[2].week, 2);
        assert_eq!(items[2].day, 1);
        assert_eq!(items[2].milestone, "Songs");
        assert_eq!(
            items[2].description.as_deref(),
            Some("Pick anything with G, C, D")
        );
    }

    #[test]
    fn test_parse_plan_key_wrapper() {
        let wrapped = format!(r#"{{"plan": {}}}"#, GUITAR);
        assert_eq!(parse_plan(&wrapped).unwrap().len(), 3);
    }

    #[test]
    fn test_parse_claude_envelope_with_code_fence() {
        let inner = format!("Here is your plan:\n\n```json\n{}\n```\n", GUITAR);
        let envelope = serde_json::json!({ "type": "result", "result": inner }).to_string();
        assert_eq!(parse_plan(&envelope).unwrap().len(), 3);
    }

    #[test]
    fn test_parse_array_surrounded_by_prose() {
        let raw = r#"Sure! [{"week": "1", "milestone": "Start [intro]", "days": [{"day": "3", "task": "Tune the guitar"}]}] Good luck."#;
        let items = parse_plan(raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].day, 3);
        assert_eq!(items[0].milestone, "Start [intro]");
    }

    #[test]
    fn test_unreadable_entries_are_skipped() {
        let raw = r#"[
            {"milestone": "no week number", "days": [{"day": 1, "task": "Lost"}]},
            {"week": 1, "milestone": "Basics", "days": [
                {"day": 1},
                {"day": 2, "task": "   "},
                {"day": 3, "task": "Keep me"}
            ]}
        ]"#;
        let items = parse_plan(raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Keep me");
    }

    #[test]
    fn test_empty_plan_is_an_error() {
        assert!(matches!(parse_plan("[]"), Err(OracleError::EmptyPlan)));
        assert!(matches!(
            parse_plan(r#"{"plan": [{"week": 1, "milestone": "x", "days": []}]}"#),
            Err(OracleError::EmptyPlan)
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            parse_plan("I could not come up with a plan."),
            Err(OracleError::Malformed(_))
        ));
        assert!(matches!(
            parse_plan(r#"{"weeks": []}"#),
            Err(OracleError::Malformed(_))
        ));
        assert!(matches!(parse_plan("42"), Err(OracleError::Malformed(_))));
    }
}
