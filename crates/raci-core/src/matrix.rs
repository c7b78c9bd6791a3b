//! Cell primitives and the structural lifecycle of the task × role grid.
//!
//! The grid is keyed by task id, then by role *name*. Every function here is
//! pure: it borrows the current matrix and returns a new one.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RaciError, Result, Role, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RaciKey {
    R,
    A,
    C,
    I,
}

impl RaciKey {
    /// Observation order when more than one flag is set.
    pub const PRIORITY: [RaciKey; 4] = [RaciKey::R, RaciKey::A, RaciKey::C, RaciKey::I];

    pub fn letter(self) -> &'static str {
        match self {
            RaciKey::R => "R",
            RaciKey::A => "A",
            RaciKey::C => "C",
            RaciKey::I => "I",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RaciKey::R => "Responsible",
            RaciKey::A => "Accountable",
            RaciKey::C => "Consulted",
            RaciKey::I => "Informed",
        }
    }

    /// Accepts a letter or the full label, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        RaciKey::PRIORITY
            .into_iter()
            .find(|k| s.eq_ignore_ascii_case(k.letter()) || s.eq_ignore_ascii_case(k.label()))
    }
}

/// One role's assignment on one task.
///
/// At most one flag should be set. The type does not enforce that; values
/// read from old shares can carry several, which validation reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RaciValue {
    #[serde(rename = "R", default)]
    pub r: bool,
    #[serde(rename = "A", default)]
    pub a: bool,
    #[serde(rename = "C", default)]
    pub c: bool,
    #[serde(rename = "I", default)]
    pub i: bool,
}

impl RaciValue {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_key(key: RaciKey) -> Self {
        Self::empty().with_flag(key, true)
    }

    pub fn is_set(&self, key: RaciKey) -> bool {
        match key {
            RaciKey::R => self.r,
            RaciKey::A => self.a,
            RaciKey::C => self.c,
            RaciKey::I => self.i,
        }
    }

    fn with_flag(mut self, key: RaciKey, on: bool) -> Self {
        match key {
            RaciKey::R => self.r = on,
            RaciKey::A => self.a = on,
            RaciKey::C => self.c = on,
            RaciKey::I => self.i = on,
        }
        self
    }

    /// The first set flag in R, A, C, I order.
    pub fn key(&self) -> Option<RaciKey> {
        RaciKey::PRIORITY.into_iter().find(|k| self.is_set(*k))
    }

    pub fn selected_count(&self) -> usize {
        RaciKey::PRIORITY.into_iter().filter(|k| self.is_set(*k)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.selected_count() == 0
    }

    /// Exclusive select: only `key` is set afterwards.
    pub fn with_single(&self, key: RaciKey) -> Self {
        Self::from_key(key)
    }

    /// Clears the value if `key` is already set, otherwise selects it exclusively.
    pub fn toggled(&self, key: RaciKey) -> Self {
        if self.is_set(key) {
            Self::empty()
        } else {
            self.with_single(key)
        }
    }

    /// Collapse to at most one flag, keeping the first in priority order.
    pub fn normalized(&self) -> Self {
        match self.key() {
            Some(k) => Self::from_key(k),
            None => Self::empty(),
        }
    }
}

impl From<RaciKey> for RaciValue {
    fn from(key: RaciKey) -> Self {
        Self::from_key(key)
    }
}

/// task id → role name → value. Missing entries read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matrix(BTreeMap<String, BTreeMap<String, RaciValue>>);

impl Matrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &str, role_name: &str) -> Option<&RaciValue> {
        self.0.get(task_id)?.get(role_name)
    }

    pub fn cell(&self, task_id: &str, role_name: &str) -> RaciValue {
        self.get(task_id, role_name).copied().unwrap_or_default()
    }

    pub fn row(&self, task_id: &str) -> Option<&BTreeMap<String, RaciValue>> {
        self.0.get(task_id)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, RaciValue>)> {
        self.0.iter()
    }

    pub fn insert(&mut self, task_id: &str, role_name: &str, value: RaciValue) {
        self.0
            .entry(task_id.to_string())
            .or_default()
            .insert(role_name.to_string(), value);
    }

    /// Every (task id, role name) pair that has an entry.
    pub fn cell_keys(&self) -> BTreeSet<(String, String)> {
        self.0
            .iter()
            .flat_map(|(t, row)| row.keys().map(move |r| (t.clone(), r.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// --- Construction ---

/// Full cross product of tasks and roles, every cell empty.
pub fn create_empty_matrix(roles: &[Role], tasks: &[Task]) -> Matrix {
    let mut matrix = Matrix::new();
    for task in tasks {
        for role in roles {
            matrix.insert(&task.id, &role.name, RaciValue::empty());
        }
    }
    matrix
}

// --- Lifecycle ---

/// Set or toggle one cell, creating the row or cell on demand.
///
/// Does not check that the task or role still exists.
pub fn update_cell(
    matrix: &Matrix,
    task_id: &str,
    role_name: &str,
    key: RaciKey,
    toggle: bool,
) -> Matrix {
    let current = matrix.cell(task_id, role_name);
    let value = if toggle {
        current.toggled(key)
    } else {
        current.with_single(key)
    };
    let mut next = matrix.clone();
    next.insert(task_id, role_name, value);
    next
}

/// Clear one cell back to empty.
pub fn clear_cell(matrix: &Matrix, task_id: &str, role_name: &str) -> Matrix {
    let mut next = matrix.clone();
    next.insert(task_id, role_name, RaciValue::empty());
    next
}

/// Add an empty cell for `role_name` at each listed task. Overwrites existing cells.
pub fn add_role<I, S>(matrix: &Matrix, role_name: &str, task_ids: I) -> Matrix
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut next = matrix.clone();
    for task_id in task_ids {
        next.insert(task_id.as_ref(), role_name, RaciValue::empty());
    }
    next
}

pub fn remove_role(matrix: &Matrix, role_name: &str) -> Matrix {
    let mut next = matrix.clone();
    for row in next.0.values_mut() {
        row.remove(role_name);
    }
    next
}

/// Move every cell keyed by `old_name` to `new_name`.
///
/// Fails without changing anything if any row already has a `new_name` cell.
pub fn rename_role(matrix: &Matrix, old_name: &str, new_name: &str) -> Result<Matrix> {
    if old_name == new_name {
        return Ok(matrix.clone());
    }
    if matrix.0.values().any(|row| row.contains_key(new_name)) {
        return Err(RaciError::RoleNameCollision(new_name.to_string()));
    }
    let mut next = matrix.clone();
    for row in next.0.values_mut() {
        if let Some(value) = row.remove(old_name) {
            row.insert(new_name.to_string(), value);
        }
    }
    Ok(next)
}

/// Add a row of empty cells for `task_id`. Replaces any existing row.
pub fn add_task<I, S>(matrix: &Matrix, task_id: &str, role_names: I) -> Matrix
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut next = matrix.clone();
    let row = role_names
        .into_iter()
        .map(|name| (name.as_ref().to_string(), RaciValue::empty()))
        .collect();
    next.0.insert(task_id.to_string(), row);
    next
}

pub fn remove_task(matrix: &Matrix, task_id: &str) -> Matrix {
    let mut next = matrix.clone();
    next.0.remove(task_id);
    next
}

/// Realign the matrix after the role and task lists were replaced wholesale.
///
/// Roles are reconciled by name first, then tasks by id. New rows are filled
/// for the post-update role list. Cells of surviving role/task pairs are kept.
pub fn migrate(
    matrix: &Matrix,
    old_roles: &[Role],
    new_roles: &[Role],
    old_tasks: &[Task],
    new_tasks: &[Task],
) -> Matrix {
    let old_role_names: BTreeSet<&str> = old_roles.iter().map(|r| r.name.as_str()).collect();
    let new_role_names: BTreeSet<&str> = new_roles.iter().map(|r| r.name.as_str()).collect();
    let old_task_ids: BTreeSet<&str> = old_tasks.iter().map(|t| t.id.as_str()).collect();
    let new_task_ids: BTreeSet<&str> = new_tasks.iter().map(|t| t.id.as_str()).collect();

    let mut next = matrix.clone();

    for name in old_role_names.difference(&new_role_names) {
        next = remove_role(&next, name);
    }
    for name in new_role_names.difference(&old_role_names) {
        next = add_role(&next, name, new_tasks.iter().map(|t| t.id.as_str()));
    }

    for id in old_task_ids.difference(&new_task_ids) {
        next = remove_task(&next, id);
    }
    for id in new_task_ids.difference(&old_task_ids) {
        next = add_task(&next, id, new_roles.iter().map(|r| r.name.as_str()));
    }

    debug!(
        roles = new_roles.len(),
        tasks = new_tasks.len(),
        cells = next.cell_keys().len(),
        "migrated matrix"
    );
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn roles(names: &[&str]) -> Vec<Role> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| Role::new(format!("role-{}", i + 1), *n))
            .collect()
    }

    fn tasks(ids: &[&str]) -> Vec<Task> {
        ids.iter().map(|id| Task::new(*id, id.to_uppercase())).collect()
    }

    #[test]
    fn active_key_follows_priority_order() {
        let v = RaciValue {
            r: false,
            a: true,
            c: false,
            i: true,
        };
        assert_eq!(v.key(), Some(RaciKey::A));
        assert_eq!(v.key(), v.key());
        assert_eq!(RaciValue::empty().key(), None);
        assert_eq!(v.normalized(), RaciValue::from_key(RaciKey::A));
    }

    #[test]
    fn set_single_is_exclusive_and_idempotent() {
        let v = RaciValue::from_key(RaciKey::R);
        let once = v.with_single(RaciKey::C);
        assert_eq!(once, RaciValue::from_key(RaciKey::C));
        assert_eq!(once.with_single(RaciKey::C), once);
    }

    #[test]
    fn toggle_clears_active_key() {
        let v = RaciValue::from_key(RaciKey::I);
        assert!(v.toggled(RaciKey::I).is_empty());
        assert_eq!(v.toggled(RaciKey::A), RaciValue::from_key(RaciKey::A));
    }

    #[test]
    fn parse_accepts_letters_and_labels() {
        assert_eq!(RaciKey::parse("a"), Some(RaciKey::A));
        assert_eq!(RaciKey::parse(" Consulted "), Some(RaciKey::C));
        assert_eq!(RaciKey::parse("X"), None);
    }

    #[test]
    fn value_serializes_as_flag_object() {
        let json = serde_json::to_string(&RaciValue::from_key(RaciKey::R)).unwrap();
        assert_eq!(json, r#"{"R":true,"A":false,"C":false,"I":false}"#);
        let partial: RaciValue = serde_json::from_str(r#"{"A":true}"#).unwrap();
        assert_eq!(partial.key(), Some(RaciKey::A));
    }

    #[test]
    fn update_cell_creates_missing_slots() {
        let m = update_cell(&Matrix::new(), "t1", "PM", RaciKey::A, false);
        assert_eq!(m.cell("t1", "PM"), RaciValue::from_key(RaciKey::A));
        let toggled = update_cell(&m, "t1", "PM", RaciKey::A, true);
        assert!(toggled.cell("t1", "PM").is_empty());
        // input untouched
        assert_eq!(m.cell("t1", "PM").key(), Some(RaciKey::A));
    }

    #[test]
    fn rename_moves_cells() {
        let m = create_empty_matrix(&roles(&["Dev"]), &tasks(&["t1", "t2"]));
        let m = update_cell(&m, "t1", "Dev", RaciKey::R, false);
        let renamed = rename_role(&m, "Dev", "Engineer").unwrap();
        assert_eq!(renamed.cell("t1", "Engineer").key(), Some(RaciKey::R));
        assert!(renamed.get("t1", "Dev").is_none());
        assert!(renamed.get("t2", "Engineer").is_some());
    }

    #[test]
    fn rename_into_existing_name_is_rejected() {
        let m = create_empty_matrix(&roles(&["Dev", "QA"]), &tasks(&["t1"]));
        let m = update_cell(&m, "t1", "QA", RaciKey::C, false);
        let err = rename_role(&m, "Dev", "QA").unwrap_err();
        assert!(matches!(err, RaciError::RoleNameCollision(ref n) if n == "QA"));
    }

    #[test]
    fn add_and_remove_keep_cross_product() {
        let mut role_names = vec!["PM".to_string(), "Dev".to_string()];
        let mut task_ids = vec!["t1".to_string()];
        let mut m = add_task(&Matrix::new(), "t1", &role_names);

        m = add_task(&m, "t2", &role_names);
        task_ids.push("t2".into());
        m = add_role(&m, "QA", &task_ids);
        role_names.push("QA".into());
        m = remove_role(&m, "PM");
        role_names.retain(|r| r != "PM");
        m = remove_task(&m, "t1");
        task_ids.retain(|t| t != "t1");

        let expected: BTreeSet<(String, String)> = task_ids
            .iter()
            .flat_map(|t| role_names.iter().map(move |r| (t.clone(), r.clone())))
            .collect();
        assert_eq!(m.cell_keys(), expected);
    }

    #[test]
    fn migrate_keeps_surviving_pairs_only() {
        let old_roles = roles(&["A", "B"]);
        let new_roles = roles(&["B", "C"]);
        let old_tasks = tasks(&["T1", "T2"]);
        let new_tasks = tasks(&["T2", "T3"]);

        let mut m = create_empty_matrix(&old_roles, &old_tasks);
        m = update_cell(&m, "T2", "B", RaciKey::A, false);
        m = update_cell(&m, "T1", "B", RaciKey::R, false);
        m = update_cell(&m, "T2", "A", RaciKey::C, false);

        let migrated = migrate(&m, &old_roles, &new_roles, &old_tasks, &new_tasks);

        let expected: BTreeSet<(String, String)> = [
            ("T2", "B"),
            ("T2", "C"),
            ("T3", "B"),
            ("T3", "C"),
        ]
        .iter()
        .map(|(t, r)| (t.to_string(), r.to_string()))
        .collect();
        assert_eq!(migrated.cell_keys(), expected);
        assert_eq!(migrated.cell("T2", "B"), RaciValue::from_key(RaciKey::A));
        assert!(migrated.cell("T2", "C").is_empty());
        assert!(migrated.cell("T3", "B").is_empty());
        assert!(migrated.cell("T3", "C").is_empty());
    }
}
