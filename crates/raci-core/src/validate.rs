//! Read-only rule checking over a full state snapshot.
//!
//! Violations are reported, never fixed. The only automatic repair lives in
//! `reconcile::repair_matrix` and runs on AI output alone.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    name_key, RaciState, MAX_DESCRIPTION_LEN, MAX_ROLES, MAX_ROLE_NAME_LEN, MAX_TASKS,
    MAX_TASK_NAME_LEN, MAX_TITLE_LEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MissingAccountable,
    MultipleSelections,
    DuplicateRole,
    DuplicateTask,
    SchemaError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
}

impl Violation {
    fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            task_id: None,
            role_name: None,
        }
    }

    fn task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    fn role(mut self, role_name: &str) -> Self {
        self.role_name = Some(role_name.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }

    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }
}

/// Run every rule. Order: schema, duplicate roles, duplicate tasks,
/// missing accountable (task order), multiple selections (task × role order).
pub fn validate(state: &RaciState) -> ValidationReport {
    let mut violations = check_schema(state);
    violations.extend(duplicate_names(
        state.roles.iter().map(|r| r.name.as_str()),
        ViolationKind::DuplicateRole,
        "role",
    ));
    violations.extend(duplicate_names(
        state.tasks.iter().map(|t| t.name.as_str()),
        ViolationKind::DuplicateTask,
        "task",
    ));
    violations.extend(missing_accountable(state));
    violations.extend(multiple_selections(state));
    ValidationReport { violations }
}

/// Structural pre-check: lengths, counts, ids, and matrix keys.
pub fn check_schema(state: &RaciState) -> Vec<Violation> {
    let mut out = Vec::new();
    let schema = |msg: String| Violation::new(ViolationKind::SchemaError, msg);

    if state.title.trim().is_empty() {
        out.push(schema("Title must not be empty".to_string()));
    }
    if state.title.chars().count() > MAX_TITLE_LEN {
        out.push(schema(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    if state.description.chars().count() > MAX_DESCRIPTION_LEN {
        out.push(schema(format!(
            "Description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    if state.roles.len() > MAX_ROLES {
        out.push(schema(format!("At most {} roles are allowed", MAX_ROLES)));
    }
    if state.tasks.len() > MAX_TASKS {
        out.push(schema(format!("At most {} tasks are allowed", MAX_TASKS)));
    }

    let mut role_ids = HashSet::new();
    for role in &state.roles {
        if role.name.trim().is_empty() {
            out.push(schema(format!("Role '{}' has an empty name", role.id)));
        } else if role.name.chars().count() > MAX_ROLE_NAME_LEN {
            out.push(
                schema(format!(
                    "Role name '{}' must be at most {} characters",
                    role.name, MAX_ROLE_NAME_LEN
                ))
                .role(&role.name),
            );
        }
        if !role_ids.insert(role.id.as_str()) {
            out.push(schema(format!("Role id '{}' is used more than once", role.id)));
        }
    }

    let mut task_ids = HashSet::new();
    for task in &state.tasks {
        if task.name.trim().is_empty() {
            out.push(schema(format!("Task '{}' has an empty name", task.id)).task(&task.id));
        } else if task.name.chars().count() > MAX_TASK_NAME_LEN {
            out.push(
                schema(format!(
                    "Task name '{}' must be at most {} characters",
                    task.name, MAX_TASK_NAME_LEN
                ))
                .task(&task.id),
            );
        }
        if !task_ids.insert(task.id.as_str()) {
            out.push(schema(format!("Task id '{}' is used more than once", task.id)).task(&task.id));
        }
    }

    let role_names: HashSet<&str> = state.roles.iter().map(|r| r.name.as_str()).collect();
    for (task_id, row) in state.matrix.rows() {
        if !task_ids.contains(task_id.as_str()) {
            out.push(schema(format!("Matrix has a row for unknown task '{}'", task_id)).task(task_id));
            continue;
        }
        for role_name in row.keys() {
            if !role_names.contains(role_name.as_str()) {
                out.push(
                    schema(format!(
                        "Matrix has a cell for unknown role '{}'",
                        role_name
                    ))
                    .task(task_id)
                    .role(role_name),
                );
            }
        }
    }

    out
}

/// One violation per offending name, in order of first appearance.
fn duplicate_names<'a>(
    names: impl Iterator<Item = &'a str>,
    kind: ViolationKind,
    label: &str,
) -> Vec<Violation> {
    let mut counts: BTreeMap<String, (usize, usize, &'a str)> = BTreeMap::new();
    for (pos, name) in names.enumerate() {
        let entry = counts.entry(name_key(name)).or_insert((pos, 0, name));
        entry.1 += 1;
    }

    let mut dups: Vec<(usize, usize, &str)> = counts
        .into_values()
        .filter(|(_, count, _)| *count > 1)
        .collect();
    dups.sort_by_key(|(pos, _, _)| *pos);

    dups.into_iter()
        .map(|(_, count, name)| {
            let v = Violation::new(
                kind,
                format!(
                    "Duplicate {} name '{}' appears {} times",
                    label,
                    name.trim(),
                    count
                ),
            );
            if kind == ViolationKind::DuplicateRole {
                v.role(name)
            } else {
                v
            }
        })
        .collect()
}

fn missing_accountable(state: &RaciState) -> Vec<Violation> {
    state
        .tasks
        .iter()
        .filter(|task| {
            !state
                .roles
                .iter()
                .any(|role| state.matrix.cell(&task.id, &role.name).a)
        })
        .map(|task| {
            Violation::new(
                ViolationKind::MissingAccountable,
                format!("Task '{}' has no Accountable role", task.name),
            )
            .task(&task.id)
        })
        .collect()
}

fn multiple_selections(state: &RaciState) -> Vec<Violation> {
    let mut out = Vec::new();
    for task in &state.tasks {
        for role in &state.roles {
            let value = state.matrix.cell(&task.id, &role.name);
            if value.selected_count() > 1 {
                out.push(
                    Violation::new(
                        ViolationKind::MultipleSelections,
                        format!(
                            "'{}' has more than one assignment on task '{}'",
                            role.name, task.name
                        ),
                    )
                    .task(&task.id)
                    .role(&role.name),
                );
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{create_empty_matrix, update_cell};
    use crate::{RaciKey, RaciValue, Role, Task};
    use pretty_assertions::assert_eq;

    fn sample() -> RaciState {
        let roles = vec![Role::new("role-1", "PM"), Role::new("role-2", "Dev")];
        let tasks = vec![Task::new("task-1", "Plan"), Task::new("task-2", "Build")];
        let mut matrix = create_empty_matrix(&roles, &tasks);
        matrix = update_cell(&matrix, "task-1", "PM", RaciKey::A, false);
        matrix = update_cell(&matrix, "task-2", "Dev", RaciKey::A, false);
        RaciState {
            title: "Launch".into(),
            description: String::new(),
            roles,
            tasks,
            matrix,
            logo: None,
        }
    }

    #[test]
    fn clean_state_has_no_violations() {
        assert!(validate(&sample()).is_valid());
    }

    #[test]
    fn case_only_duplicate_role_reported_once() {
        let mut state = sample();
        state.roles = vec![
            Role::new("role-1", "qa engineer"),
            Role::new("role-2", "QA Engineer"),
        ];
        state.matrix = create_empty_matrix(&state.roles, &state.tasks);
        let report = validate(&state);
        assert_eq!(report.count(ViolationKind::DuplicateRole), 1);
        let v = report.of_kind(ViolationKind::DuplicateRole).next().unwrap();
        assert_eq!(v.role_name.as_deref(), Some("qa engineer"));
    }

    #[test]
    fn three_copies_of_a_task_name_still_one_violation() {
        let mut state = sample();
        state.tasks.push(Task::new("task-3", " plan"));
        state.tasks.push(Task::new("task-4", "PLAN "));
        let report = validate(&state);
        assert_eq!(report.count(ViolationKind::DuplicateTask), 1);
    }

    #[test]
    fn missing_accountable_one_per_task() {
        let mut state = sample();
        state.matrix = create_empty_matrix(&state.roles, &state.tasks);
        let report = validate(&state);
        let tasks: Vec<_> = report
            .of_kind(ViolationKind::MissingAccountable)
            .map(|v| v.task_id.clone().unwrap())
            .collect();
        assert_eq!(tasks, vec!["task-1".to_string(), "task-2".to_string()]);
    }

    #[test]
    fn multiple_flags_flagged_per_cell() {
        let mut state = sample();
        state.matrix.insert(
            "task-1",
            "Dev",
            RaciValue {
                r: true,
                a: false,
                c: true,
                i: false,
            },
        );
        let report = validate(&state);
        assert_eq!(report.count(ViolationKind::MultipleSelections), 1);
        let v = report.of_kind(ViolationKind::MultipleSelections).next().unwrap();
        assert_eq!(v.task_id.as_deref(), Some("task-1"));
        assert_eq!(v.role_name.as_deref(), Some("Dev"));
    }

    #[test]
    fn schema_errors_for_blank_title_and_orphan_rows() {
        let mut state = sample();
        state.title = "  ".into();
        state.matrix.insert("ghost", "PM", RaciValue::empty());
        state.matrix.insert("task-1", "Nobody", RaciValue::empty());
        let report = validate(&state);
        assert_eq!(report.count(ViolationKind::SchemaError), 3);
    }

    #[test]
    fn validation_is_repeatable() {
        let mut state = sample();
        state.roles.push(Role::new("role-3", "pm"));
        state.matrix = create_empty_matrix(&state.roles, &state.tasks);
        let first = validate(&state);
        let second = validate(&state);
        assert_eq!(first, second);
        assert!(!first.is_valid());
    }

    #[test]
    fn violation_kind_serializes_snake_case() {
        let v = Violation::new(ViolationKind::MissingAccountable, "x").task("task-1");
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "missing_accountable");
        assert_eq!(json["taskId"], "task-1");
    }
}
