use std::collections::{BTreeMap, HashSet};

use raci_core::matrix::create_empty_matrix;
use raci_core::{
    name_key, next_role_id, next_task_id, Confidence, InferenceResult, RaciKey, RaciValue, Role,
    Task, MAX_ROLES, MAX_ROLE_NAME_LEN, MAX_TASKS, MAX_TASK_NAME_LEN,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object in response")]
    NoJson,
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("response has no {0}")]
    Missing(&'static str),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LlmNamed {
    Full {
        #[serde(default)]
        id: Option<String>,
        name: String,
    },
    Bare(String),
}

impl LlmNamed {
    fn into_parts(self) -> (Option<String>, String) {
        match self {
            LlmNamed::Full { id, name } => (id, name),
            LlmNamed::Bare(name) => (None, name),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LlmCell {
    Letter(String),
    Flags(RaciValue),
}

impl LlmCell {
    /// At most one flag survives, first in R, A, C, I order.
    fn into_value(self) -> RaciValue {
        match self {
            LlmCell::Letter(s) => s
                .trim()
                .chars()
                .next()
                .and_then(|c| RaciKey::parse(&c.to_string()))
                .map(RaciValue::from_key)
                .unwrap_or_default(),
            LlmCell::Flags(v) => v.normalized(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmResponse {
    roles: Vec<LlmNamed>,
    tasks: Vec<LlmNamed>,
    matrix: BTreeMap<String, BTreeMap<String, Option<LlmCell>>>,
    #[serde(default, alias = "follow_up_questions")]
    follow_up_questions: Vec<String>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Extract the outermost JSON object substring from raw model output.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

fn clip(name: &str, max: usize) -> String {
    name.trim().chars().take(max).collect()
}

/// Keep the first of each name, give every entry a unique id.
/// Returns the cleaned list plus the id the model gave each kept entry, which
/// may differ from the assigned one when it collided.
fn normalize<T>(
    items: Vec<LlmNamed>,
    max_items: usize,
    max_len: usize,
    make: impl Fn(String, String) -> T,
    next_id: impl Fn(&[T]) -> String,
    id_of: impl Fn(&T) -> &str,
) -> Vec<(T, Option<String>)> {
    let mut seen = HashSet::new();
    let mut out: Vec<T> = Vec::new();
    let mut original_ids = Vec::new();
    for item in items {
        let (id, name) = item.into_parts();
        let name = clip(&name, max_len);
        if name.is_empty() || !seen.insert(name_key(&name)) {
            continue;
        }
        if out.len() >= max_items {
            break;
        }
        let id = id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let assigned = match &id {
            Some(id) if !out.iter().any(|t| id_of(t) == id.as_str()) => id.clone(),
            _ => next_id(&out),
        };
        out.push(make(assigned, name));
        original_ids.push(id);
    }
    out.into_iter().zip(original_ids).collect()
}

fn parse_confidence(s: &str) -> Option<Confidence> {
    match s.trim().to_ascii_lowercase().as_str() {
        "high" => Some(Confidence::High),
        "medium" => Some(Confidence::Medium),
        "low" => Some(Confidence::Low),
        _ => None,
    }
}

/// Parse raw model output into an [`InferenceResult`].
///
/// Matrix rows may be keyed by task id or task name, cells by role name or
/// role id. Unknown keys are dropped, and the result always covers the full
/// task × role cross product.
pub fn parse_inference(raw: &str) -> Result<InferenceResult, ParseError> {
    let json = extract_json_object(raw).ok_or(ParseError::NoJson)?;
    let response: LlmResponse = serde_json::from_str(json)?;

    let roles = normalize(
        response.roles,
        MAX_ROLES,
        MAX_ROLE_NAME_LEN,
        Role::new,
        |r: &[Role]| next_role_id(r),
        |r: &Role| r.id.as_str(),
    );
    let tasks = normalize(
        response.tasks,
        MAX_TASKS,
        MAX_TASK_NAME_LEN,
        Task::new,
        |t: &[Task]| next_task_id(t),
        |t: &Task| t.id.as_str(),
    );
    if roles.is_empty() {
        return Err(ParseError::Missing("roles"));
    }
    if tasks.is_empty() {
        return Err(ParseError::Missing("tasks"));
    }

    // Ids as the model wrote them take precedence over reassigned ones.
    let resolve_task = |key: &str| -> Option<&Task> {
        tasks
            .iter()
            .find(|(_, orig)| orig.as_deref() == Some(key))
            .or_else(|| tasks.iter().find(|(t, _)| t.id == key))
            .or_else(|| tasks.iter().find(|(t, _)| name_key(&t.name) == name_key(key)))
            .map(|(t, _)| t)
    };
    let resolve_role = |key: &str| -> Option<&Role> {
        roles
            .iter()
            .find(|(r, _)| r.name == key)
            .or_else(|| roles.iter().find(|(r, _)| name_key(&r.name) == name_key(key)))
            .or_else(|| roles.iter().find(|(_, orig)| orig.as_deref() == Some(key)))
            .or_else(|| roles.iter().find(|(r, _)| r.id == key))
            .map(|(r, _)| r)
    };

    let mut matrix = create_empty_matrix(
        &roles.iter().map(|(r, _)| r.clone()).collect::<Vec<_>>(),
        &tasks.iter().map(|(t, _)| t.clone()).collect::<Vec<_>>(),
    );
    let mut dropped = 0usize;
    for (task_key, row) in response.matrix {
        let Some(task) = resolve_task(&task_key) else {
            dropped += row.len();
            continue;
        };
        for (role_key, cell) in row {
            match resolve_role(&role_key) {
                Some(role) => {
                    let value = cell.map(LlmCell::into_value).unwrap_or_default();
                    matrix.insert(&task.id, &role.name, value);
                }
                None => dropped += 1,
            }
        }
    }
    if dropped > 0 {
        debug!(dropped, "ignored matrix cells with unknown task or role");
    }

    Ok(InferenceResult {
        roles: roles.into_iter().map(|(r, _)| r).collect(),
        tasks: tasks.into_iter().map(|(t, _)| t).collect(),
        matrix,
        follow_up_questions: response
            .follow_up_questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect(),
        confidence: response.confidence.as_deref().and_then(parse_confidence),
        suggestions: response.suggestions,
    })
}

/// First non-empty line, without quotes, a "Title:" prefix, or trailing punctuation.
pub fn clean_title(raw: &str, max_len: usize) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Title:")
        .or_else(|| line.strip_prefix("title:"))
        .unwrap_or(line)
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim_end_matches(|c: char| c == '.' || c == '!')
        .trim();
    if line.is_empty() {
        return None;
    }
    Some(line.chars().take(max_len).collect::<String>().trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_fenced_json_with_letters() {
        let raw = r#"Here you go:
```json
{"roles":[{"id":"role-1","name":"PM"},{"id":"role-2","name":"Dev"}],
 "tasks":[{"id":"task-1","name":"Plan"}],
 "matrix":{"task-1":{"PM":"A","Dev":"c"}},
 "followUpQuestions":["Who signs off?", " "],
 "confidence":"High"}
```"#;
        let result = parse_inference(raw).unwrap();
        assert_eq!(result.roles.len(), 2);
        assert_eq!(result.matrix.cell("task-1", "PM").key(), Some(RaciKey::A));
        assert_eq!(result.matrix.cell("task-1", "Dev").key(), Some(RaciKey::C));
        assert_eq!(result.follow_up_questions, vec!["Who signs off?"]);
        assert_eq!(result.confidence, Some(Confidence::High));
    }

    #[test]
    fn multi_flag_cells_are_coerced_first_wins() {
        let raw = r#"{"roles":[{"name":"PM"}],"tasks":[{"name":"Plan"}],
            "matrix":{"Plan":{"PM":{"R":false,"A":true,"C":true,"I":true}}}}"#;
        let result = parse_inference(raw).unwrap();
        let value = result.matrix.cell("task-1", "PM");
        assert_eq!(value, RaciValue::from_key(RaciKey::A));
        assert_eq!(value.selected_count(), 1);
    }

    #[test]
    fn missing_ids_and_duplicates_are_fixed() {
        let raw = r#"{"roles":["PM",{"name":"pm"},{"id":"r","name":"Dev"},{"id":"r","name":"QA"}],
            "tasks":[{"id":"t-9","name":"Build"}],
            "matrix":{"t-9":{"pm":"R","r":"A","Nobody":"C"},"ghost":{"PM":"A"}}}"#;
        let result = parse_inference(raw).unwrap();
        let roles: Vec<(&str, &str)> = result
            .roles
            .iter()
            .map(|r| (r.id.as_str(), r.name.as_str()))
            .collect();
        assert_eq!(roles, vec![("role-1", "PM"), ("r", "Dev"), ("role-2", "QA")]);
        assert_eq!(result.matrix.cell("t-9", "PM").key(), Some(RaciKey::R));
        assert_eq!(result.matrix.cell("t-9", "Dev").key(), Some(RaciKey::A));
        assert!(result.matrix.cell("t-9", "QA").is_empty());
        assert_eq!(result.matrix.cell_keys().len(), 3);
    }

    #[test]
    fn missing_required_fields_fail() {
        assert!(matches!(parse_inference("no json here"), Err(ParseError::NoJson)));
        assert!(matches!(
            parse_inference(r#"{"roles":[],"tasks":[]}"#),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_inference(r#"{"roles":[],"tasks":[{"name":"x"}],"matrix":{}}"#),
            Err(ParseError::Missing("roles"))
        ));
    }

    #[test]
    fn titles_are_cleaned() {
        assert_eq!(
            clean_title("\n\"Mobile App Launch.\"\nextra", 60).as_deref(),
            Some("Mobile App Launch")
        );
        assert_eq!(clean_title("Title: **Data Platform**", 60).as_deref(), Some("Data Platform"));
        assert_eq!(clean_title("  \n ", 60), None);
        assert_eq!(clean_title("abcdef ghi", 7).as_deref(), Some("abcdef"));
    }

    #[test]
    fn reassigned_ids_still_route_their_rows() {
        let raw = r#"{"roles":[{"name":"PM"}],
            "tasks":[{"name":"Plan"},{"id":"task-1","name":"Build"}],
            "matrix":{"task-1":{"PM":"R"}}}"#;
        let result = parse_inference(raw).unwrap();
        let tasks: Vec<(&str, &str)> = result
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.name.as_str()))
            .collect();
        assert_eq!(tasks, vec![("task-1", "Plan"), ("task-2", "Build")]);
        assert_eq!(result.matrix.cell("task-2", "PM").key(), Some(RaciKey::R));
        assert!(result.matrix.cell("task-1", "PM").is_empty());
    }
}
