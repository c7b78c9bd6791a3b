//! Combining AI output with a fresh or an existing state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    name_key, next_role_id, next_task_id, Matrix, RaciKey, RaciState, RaciValue, Role, Task,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Roles, tasks and matrix as produced by an inference (AI or fallback).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceResult {
    pub roles: Vec<Role>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub matrix: Matrix,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Fresh-generation post-processing: guarantee an Accountable on every task.
pub fn enhance_ai_result(mut result: InferenceResult) -> InferenceResult {
    result.matrix = repair_matrix(&result.roles, &result.tasks, &result.matrix);
    result
}

/// Give every task without an Accountable one.
///
/// Promotes the first role (in role order) that already has any assignment on
/// the task; if nobody is involved, the first role becomes Accountable. Tasks
/// that already have one or more Accountables are left alone.
pub fn repair_matrix(roles: &[Role], tasks: &[Task], matrix: &Matrix) -> Matrix {
    let mut next = matrix.clone();
    let Some(first) = roles.first() else {
        return next;
    };

    for task in tasks {
        if roles.iter().any(|r| next.cell(&task.id, &r.name).a) {
            continue;
        }
        let promoted = roles
            .iter()
            .find(|r| !next.cell(&task.id, &r.name).is_empty())
            .unwrap_or(first);
        debug!(task = %task.name, role = %promoted.name, "assigning missing accountable");
        next.insert(&task.id, &promoted.name, RaciValue::from_key(RaciKey::A));
    }
    next
}

/// Merge AI suggestions into a state the user has already edited.
///
/// Existing roles and tasks are kept; AI roles and tasks are appended when no
/// existing one has the same name. Existing cells are never touched. Cells
/// missing from the merged cross product take the AI value, else empty.
pub fn merge_with_existing(existing: &RaciState, ai: &InferenceResult) -> RaciState {
    let mut roles = existing.roles.clone();
    // merged role name -> AI role name it inherits suggestions from
    let mut role_sources: Vec<(String, Option<String>)> = Vec::new();
    for role in &existing.roles {
        let ai_name = ai
            .roles
            .iter()
            .find(|r| name_key(&r.name) == name_key(&role.name))
            .map(|r| r.name.clone());
        role_sources.push((role.name.clone(), ai_name));
    }
    let mut seen: HashSet<String> = roles.iter().map(|r| name_key(&r.name)).collect();
    for ai_role in &ai.roles {
        if !seen.insert(name_key(&ai_role.name)) {
            continue;
        }
        let id = if roles.iter().any(|r| r.id == ai_role.id) {
            next_role_id(&roles)
        } else {
            ai_role.id.clone()
        };
        roles.push(Role::new(id, ai_role.name.clone()));
        role_sources.push((ai_role.name.clone(), Some(ai_role.name.clone())));
    }

    let mut tasks = existing.tasks.clone();
    // merged task id -> AI task id it inherits suggestions from
    let mut task_sources: Vec<(String, Option<String>)> = Vec::new();
    for task in &existing.tasks {
        let ai_id = ai
            .tasks
            .iter()
            .find(|t| name_key(&t.name) == name_key(&task.name))
            .map(|t| t.id.clone());
        task_sources.push((task.id.clone(), ai_id));
    }
    let mut seen: HashSet<String> = tasks.iter().map(|t| name_key(&t.name)).collect();
    for ai_task in &ai.tasks {
        if !seen.insert(name_key(&ai_task.name)) {
            continue;
        }
        let id = if tasks.iter().any(|t| t.id == ai_task.id) {
            next_task_id(&tasks)
        } else {
            ai_task.id.clone()
        };
        tasks.push(Task::new(id.clone(), ai_task.name.clone()));
        task_sources.push((id, Some(ai_task.id.clone())));
    }

    let mut matrix = existing.matrix.clone();
    for (task_id, ai_task_id) in &task_sources {
        for (role_name, ai_role_name) in &role_sources {
            if matrix.get(task_id, role_name).is_some() {
                continue;
            }
            let suggested = match (ai_task_id, ai_role_name) {
                (Some(t), Some(r)) => ai.matrix.cell(t, r),
                _ => RaciValue::empty(),
            };
            matrix.insert(task_id, role_name, suggested);
        }
    }

    debug!(
        roles = roles.len(),
        tasks = tasks.len(),
        added_roles = roles.len() - existing.roles.len(),
        added_tasks = tasks.len() - existing.tasks.len(),
        "merged AI result into existing matrix"
    );

    RaciState {
        title: existing.title.clone(),
        description: existing.description.clone(),
        roles,
        tasks,
        matrix,
        logo: existing.logo.clone(),
    }
}

/// Additive heuristic over the size of the result and the remaining questions.
pub fn calculate_confidence(
    role_count: usize,
    task_count: usize,
    description: &str,
    follow_up_count: usize,
) -> Confidence {
    let mut score = 0;

    score += match role_count {
        n if n >= 4 => 2,
        n if n >= 2 => 1,
        _ => 0,
    };
    score += match task_count {
        n if n >= 5 => 2,
        n if n >= 3 => 1,
        _ => 0,
    };
    score += match description.chars().count() {
        n if n > 200 => 2,
        n if n > 100 => 1,
        _ => 0,
    };
    score += match follow_up_count {
        0 => 2,
        n if n <= 2 => 1,
        _ => 0,
    };

    if score >= 6 {
        Confidence::High
    } else if score >= 3 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Share of tasks above which one Accountable role counts as overloaded.
const OVERLOAD_RATIO: f64 = 0.6;

/// Advisory notes on the final matrix.
pub fn generate_suggestions(roles: &[Role], tasks: &[Task], matrix: &Matrix) -> Vec<String> {
    let mut out = Vec::new();

    if roles.len() < 3 {
        out.push(
            "Consider adding more roles: most projects involve at least three parties \
             (e.g. a sponsor, the people doing the work, and the people reviewing it)."
                .to_string(),
        );
    }
    if tasks.len() < 5 {
        out.push(
            "Consider breaking the work into more tasks so responsibilities are easier to assign."
                .to_string(),
        );
    }

    let unaccountable: Vec<&str> = tasks
        .iter()
        .filter(|t| !roles.iter().any(|r| matrix.cell(&t.id, &r.name).a))
        .map(|t| t.name.as_str())
        .collect();
    if !unaccountable.is_empty() {
        out.push(format!(
            "Assign an Accountable role to: {}.",
            unaccountable.join(", ")
        ));
    }

    if !tasks.is_empty() {
        for role in roles {
            let count = tasks
                .iter()
                .filter(|t| matrix.cell(&t.id, &role.name).a)
                .count();
            if count as f64 / tasks.len() as f64 > OVERLOAD_RATIO {
                out.push(format!(
                    "'{}' is Accountable for {} of {} tasks. Consider delegating some accountability.",
                    role.name,
                    count,
                    tasks.len()
                ));
            }
        }
    }

    out
}
