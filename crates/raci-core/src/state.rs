//! Checked, all-or-nothing edits on a whole [`RaciState`].
//!
//! Each method borrows the current state and returns a new one, or an error
//! and no new state at all. The matrix functions underneath stay permissive;
//! the checks here are what keep ids and names valid.

use tracing::debug;

use crate::error::check_text;
use crate::matrix::{self, create_empty_matrix};
use crate::{
    name_key, next_role_id, next_task_id, Logo, RaciError, RaciKey, RaciState, Result, Role, Task,
    MAX_DESCRIPTION_LEN, MAX_ROLES, MAX_ROLE_NAME_LEN, MAX_TASKS, MAX_TASK_NAME_LEN,
    MAX_TITLE_LEN,
};

impl RaciState {
    /// A new state with the cross-product matrix already laid out.
    pub fn new(title: &str, description: &str, roles: Vec<Role>, tasks: Vec<Task>) -> Self {
        let matrix = create_empty_matrix(&roles, &tasks);
        Self {
            title: title.to_string(),
            description: description.to_string(),
            roles,
            tasks,
            matrix,
            logo: None,
        }
    }

    fn check_role_name(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        check_text("role name", name, MAX_ROLE_NAME_LEN, false)?;
        let key = name_key(name);
        if self
            .roles
            .iter()
            .any(|r| Some(r.id.as_str()) != except_id && name_key(&r.name) == key)
        {
            return Err(RaciError::DuplicateRole(name.to_string()));
        }
        Ok(())
    }

    fn check_task_name(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        check_text("task name", name, MAX_TASK_NAME_LEN, false)?;
        let key = name_key(name);
        if self
            .tasks
            .iter()
            .any(|t| Some(t.id.as_str()) != except_id && name_key(&t.name) == key)
        {
            return Err(RaciError::DuplicateTask(name.to_string()));
        }
        Ok(())
    }

    pub fn with_title(&self, title: &str) -> Result<Self> {
        let title = title.trim();
        check_text("title", title, MAX_TITLE_LEN, false)?;
        let mut next = self.clone();
        next.title = title.to_string();
        Ok(next)
    }

    pub fn with_description(&self, description: &str) -> Result<Self> {
        check_text("description", description, MAX_DESCRIPTION_LEN, true)?;
        let mut next = self.clone();
        next.description = description.to_string();
        Ok(next)
    }

    pub fn with_logo(&self, logo: Logo) -> Self {
        let mut next = self.clone();
        next.logo = Some(logo);
        next
    }

    pub fn without_logo(&self) -> Self {
        let mut next = self.clone();
        next.logo = None;
        next
    }

    pub fn with_role_added(&self, name: &str) -> Result<Self> {
        let name = name.trim();
        self.check_role_name(name, None)?;
        if self.roles.len() >= MAX_ROLES {
            return Err(RaciError::TooMany {
                what: "roles",
                max: MAX_ROLES,
            });
        }
        let mut next = self.clone();
        next.roles.push(Role::new(next_role_id(&self.roles), name));
        next.matrix = matrix::add_role(&self.matrix, name, self.tasks.iter().map(|t| &t.id));
        debug!(role = name, "added role");
        Ok(next)
    }

    pub fn with_role_renamed(&self, role_id: &str, new_name: &str) -> Result<Self> {
        let new_name = new_name.trim();
        let role = self
            .role_by_id(role_id)
            .ok_or_else(|| RaciError::UnknownRole(role_id.to_string()))?;
        self.check_role_name(new_name, Some(role_id))?;

        let matrix = matrix::rename_role(&self.matrix, &role.name, new_name)?;
        let mut next = self.clone();
        next.matrix = matrix;
        for r in next.roles.iter_mut().filter(|r| r.id == role_id) {
            r.name = new_name.to_string();
        }
        Ok(next)
    }

    pub fn with_role_removed(&self, role_id: &str) -> Result<Self> {
        let role = self
            .role_by_id(role_id)
            .ok_or_else(|| RaciError::UnknownRole(role_id.to_string()))?;
        let mut next = self.clone();
        next.matrix = matrix::remove_role(&self.matrix, &role.name);
        next.roles.retain(|r| r.id != role_id);
        Ok(next)
    }

    pub fn with_task_added(&self, name: &str) -> Result<Self> {
        let name = name.trim();
        self.check_task_name(name, None)?;
        if self.tasks.len() >= MAX_TASKS {
            return Err(RaciError::TooMany {
                what: "tasks",
                max: MAX_TASKS,
            });
        }
        let id = next_task_id(&self.tasks);
        let mut next = self.clone();
        next.matrix = matrix::add_task(&self.matrix, &id, self.roles.iter().map(|r| &r.name));
        next.tasks.push(Task::new(id, name));
        debug!(task = name, "added task");
        Ok(next)
    }

    pub fn with_task_renamed(&self, task_id: &str, new_name: &str) -> Result<Self> {
        let new_name = new_name.trim();
        if self.task_by_id(task_id).is_none() {
            return Err(RaciError::UnknownTask(task_id.to_string()));
        }
        self.check_task_name(new_name, Some(task_id))?;
        let mut next = self.clone();
        for t in next.tasks.iter_mut().filter(|t| t.id == task_id) {
            t.name = new_name.to_string();
        }
        Ok(next)
    }

    pub fn with_task_removed(&self, task_id: &str) -> Result<Self> {
        if self.task_by_id(task_id).is_none() {
            return Err(RaciError::UnknownTask(task_id.to_string()));
        }
        let mut next = self.clone();
        next.matrix = matrix::remove_task(&self.matrix, task_id);
        next.tasks.retain(|t| t.id != task_id);
        Ok(next)
    }

    fn check_cell(&self, task_id: &str, role_name: &str) -> Result<()> {
        if self.task_by_id(task_id).is_none() {
            return Err(RaciError::UnknownTask(task_id.to_string()));
        }
        if self.role_by_name(role_name).is_none() {
            return Err(RaciError::UnknownRole(role_name.to_string()));
        }
        Ok(())
    }

    /// Set (or toggle) one assignment. Unlike [`matrix::update_cell`], unknown
    /// tasks and roles are rejected.
    pub fn with_cell(&self, task_id: &str, role_name: &str, key: RaciKey, toggle: bool) -> Result<Self> {
        self.check_cell(task_id, role_name)?;
        let mut next = self.clone();
        next.matrix = matrix::update_cell(&self.matrix, task_id, role_name, key, toggle);
        Ok(next)
    }

    pub fn with_cell_cleared(&self, task_id: &str, role_name: &str) -> Result<Self> {
        self.check_cell(task_id, role_name)?;
        let mut next = self.clone();
        next.matrix = matrix::clear_cell(&self.matrix, task_id, role_name);
        Ok(next)
    }

    /// Lay out empty cells for any task/role pair the matrix lacks.
    pub fn with_missing_cells_filled(&self) -> Self {
        let mut next = self.clone();
        for task in &self.tasks {
            for role in &self.roles {
                if next.matrix.get(&task.id, &role.name).is_none() {
                    next.matrix.insert(&task.id, &role.name, Default::default());
                }
            }
        }
        next
    }

    /// Replace the role and task lists wholesale, migrating the matrix.
    pub fn with_roles_and_tasks(&self, roles: Vec<Role>, tasks: Vec<Task>) -> Self {
        let matrix = matrix::migrate(&self.matrix, &self.roles, &roles, &self.tasks, &tasks);
        Self {
            roles,
            tasks,
            matrix,
            ..self.clone()
        }
    }
}
