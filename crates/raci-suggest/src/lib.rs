//! AI collaborator: prompt assembly, the inference round trip, and the
//! deterministic fallback when the model is unavailable or answers badly.

pub mod engine;
pub mod parse;
pub mod prompt;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use raci_core::fallback::fallback_inference;
use raci_core::reconcile::{
    calculate_confidence, enhance_ai_result, generate_suggestions, merge_with_existing,
};
use raci_core::title::synthesize_title;
use raci_core::{
    check_text, AiSettings, Confidence, InferenceResult, RaciState, Result, MAX_DESCRIPTION_LEN,
};

use engine::EngineError;

/// Longest AI title kept before falling back to synthesis.
pub const MAX_AI_TITLE_LEN: usize = 60;

#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    pub description: String,
    pub seed_roles: Vec<String>,
    /// Follow-up question → the user's answer.
    pub previous_answers: BTreeMap<String, String>,
    pub existing: Option<RaciState>,
    /// Merge into `existing` instead of replacing it.
    pub keep_existing_data: bool,
}

impl InferenceRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_text("description", &self.description, MAX_DESCRIPTION_LEN, false)
    }

    fn merge_target(&self) -> Option<&RaciState> {
        self.existing.as_ref().filter(|_| self.keep_existing_data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Ai,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedMatrix {
    #[serde(flatten)]
    pub result: InferenceResult,
    pub source: Source,
}

impl GeneratedMatrix {
    /// Replace the structure of `base`, keeping its title, description and logo.
    pub fn apply_to(&self, base: &RaciState) -> RaciState {
        RaciState {
            roles: self.result.roles.clone(),
            tasks: self.result.tasks.clone(),
            matrix: self.result.matrix.clone(),
            ..base.clone()
        }
    }
}

fn merged(request: &InferenceRequest, result: InferenceResult) -> InferenceResult {
    match request.merge_target() {
        Some(existing) => {
            let state = merge_with_existing(existing, &result);
            InferenceResult {
                roles: state.roles,
                tasks: state.tasks,
                matrix: state.matrix,
                ..result
            }
        }
        None => result,
    }
}

/// Model suggestions first, then heuristic ones not already present.
fn with_suggestions(mut result: InferenceResult) -> InferenceResult {
    for s in generate_suggestions(&result.roles, &result.tasks, &result.matrix) {
        if !result.suggestions.contains(&s) {
            result.suggestions.push(s);
        }
    }
    result
}

/// Everything after the network call: parse, repair, merge, score.
///
/// Any engine or parse failure yields the fallback inference instead.
pub fn resolve(
    raw: std::result::Result<String, EngineError>,
    request: &InferenceRequest,
) -> GeneratedMatrix {
    let parsed = raw
        .map_err(|e| e.to_string())
        .and_then(|text| parse::parse_inference(&text).map_err(|e| e.to_string()));

    match parsed {
        Ok(result) => {
            let mut result = merged(request, enhance_ai_result(result));
            result.confidence = Some(calculate_confidence(
                result.roles.len(),
                result.tasks.len(),
                &request.description,
                result.follow_up_questions.len(),
            ));
            let result = with_suggestions(result);
            info!(
                roles = result.roles.len(),
                tasks = result.tasks.len(),
                questions = result.follow_up_questions.len(),
                "generated matrix from AI"
            );
            GeneratedMatrix {
                result,
                source: Source::Ai,
            }
        }
        Err(reason) => {
            warn!(%reason, "AI inference unavailable, using fallback");
            let mut result = merged(
                request,
                fallback_inference(&request.description, &request.seed_roles),
            );
            result.confidence = Some(Confidence::Low);
            GeneratedMatrix {
                result: with_suggestions(result),
                source: Source::Fallback,
            }
        }
    }
}

/// Infer a matrix for `request`. Only an invalid request is an error.
pub async fn infer_matrix(request: &InferenceRequest, settings: &AiSettings) -> Result<GeneratedMatrix> {
    request.validate()?;
    let system = prompt::system_prompt();
    let user_msg = prompt::build_prompt(request);
    let raw = engine::generate_with_retry(settings, &system, &user_msg).await;
    Ok(resolve(raw, request))
}

/// Title from an endpoint body: `{"title": ...}` or plain text.
fn ai_title(raw: &str) -> Option<String> {
    let text = match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(serde_json::Value::Object(map)) => map.get("title")?.as_str()?.to_string(),
        _ => raw.to_string(),
    };
    parse::clean_title(&text, MAX_AI_TITLE_LEN)
}

/// Short project title from the model, else synthesized from keywords.
pub async fn generate_title(description: &str, settings: &AiSettings) -> String {
    let raw = engine::generate_with_retry(
        settings,
        prompt::title_system_prompt(),
        &prompt::title_prompt(description),
    )
    .await;
    match raw.as_deref().ok().and_then(ai_title) {
        Some(title) => title,
        None => {
            if let Err(e) = &raw {
                warn!(error = %e, "title generation unavailable, synthesizing");
            }
            synthesize_title(description)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use raci_core::matrix::update_cell;
    use raci_core::validate::validate;
    use raci_core::{RaciKey, Role, Task};

    const AI_RESPONSE: &str = r#"{
        "roles":[{"name":"Product Owner"},{"name":"Developer"},{"name":"Tester"}],
        "tasks":[{"name":"Backlog"},{"name":"Build"},{"name":"Verify"}],
        "matrix":{
            "Backlog":{"Product Owner":"A","Developer":"C"},
            "Build":{"Developer":"R","Tester":"I"},
            "Verify":{"Tester":"A","Product Owner":"I"}
        },
        "followUpQuestions":["Is there a release manager?"],
        "confidence":"high"
    }"#;

    #[test]
    fn ai_result_is_repaired_and_scored() {
        let req = InferenceRequest::new("a short one");
        let generated = resolve(Ok(AI_RESPONSE.to_string()), &req);
        assert_eq!(generated.source, Source::Ai);
        let result = &generated.result;
        // Build had no Accountable: the first involved role is promoted.
        assert_eq!(result.matrix.cell("task-2", "Developer").key(), Some(RaciKey::A));
        // 3 roles (+1), 3 tasks (+1), short description (0), one question (+1)
        assert_eq!(result.confidence, Some(Confidence::Medium));
        let state = generated.apply_to(&RaciState::new("T", "", vec![], vec![]));
        assert!(validate(&state).is_valid(), "{:?}", validate(&state).violations);
    }

    #[test]
    fn engine_failure_falls_back() {
        let mut req = InferenceRequest::new("mobile app with PM, 3 developers, QA");
        req.seed_roles = vec![];
        let generated = resolve(Err(EngineError::Timeout(60)), &req);
        assert_eq!(generated.source, Source::Fallback);
        assert_eq!(generated.result.confidence, Some(Confidence::Low));
        assert_eq!(generated.result.tasks.len(), 5);
    }

    #[test]
    fn malformed_output_falls_back() {
        let req = InferenceRequest::new("website");
        let generated = resolve(Ok("I cannot help with that.".into()), &req);
        assert_eq!(generated.source, Source::Fallback);
    }

    #[test]
    fn keep_existing_merges_without_overwriting() {
        let roles = vec![Role::new("role-1", "Developer")];
        let tasks = vec![Task::new("task-1", "Build")];
        let mut existing = RaciState::new("Existing", "d", roles, tasks);
        existing.matrix = update_cell(&existing.matrix, "task-1", "Developer", RaciKey::C, false);

        let mut req = InferenceRequest::new("rebuild it");
        req.existing = Some(existing.clone());
        req.keep_existing_data = true;
        let generated = resolve(Ok(AI_RESPONSE.to_string()), &req);

        let names: Vec<&str> = generated.result.roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Developer", "Product Owner", "Tester"]);
        assert_eq!(generated.result.tasks[0].id, "task-1");
        assert_eq!(
            generated.result.matrix.cell("task-1", "Developer").key(),
            Some(RaciKey::C)
        );
        let state = generated.apply_to(&existing);
        assert_eq!(state.title, "Existing");
    }

    #[test]
    fn existing_is_ignored_unless_kept() {
        let existing = RaciState::new("E", "", vec![Role::new("role-1", "Legal")], vec![]);
        let mut req = InferenceRequest::new("rebuild it");
        req.existing = Some(existing);
        let generated = resolve(Ok(AI_RESPONSE.to_string()), &req);
        assert!(generated.result.roles.iter().all(|r| r.name != "Legal"));
    }

    #[test]
    fn blank_description_is_rejected() {
        assert!(InferenceRequest::new("  ").validate().is_err());
        assert!(InferenceRequest::new("x".repeat(MAX_DESCRIPTION_LEN + 1))
            .validate()
            .is_err());
    }

    #[test]
    fn ai_titles_accept_json_or_text() {
        assert_eq!(ai_title(r#"{"title":"CRM Rollout"}"#).as_deref(), Some("CRM Rollout"));
        assert_eq!(ai_title("\"Data Lake Migration\"\n").as_deref(), Some("Data Lake Migration"));
        assert_eq!(ai_title(r#"{"other":1}"#), None);
    }

    #[tokio::test]
    async fn title_falls_back_without_ai() {
        let title = generate_title("mobile app launch", &AiSettings::default()).await;
        assert_eq!(title, synthesize_title("mobile app launch"));
    }
}
