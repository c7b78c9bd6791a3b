pub mod error;
pub mod fallback;
pub mod matrix;
pub mod reconcile;
pub mod rules;
pub mod share;
pub mod state;
pub mod store;
pub mod title;
pub mod validate;

use base64::Engine;
use serde::{Deserialize, Serialize};

pub use error::{check_text, RaciError, Result};
pub use matrix::{Matrix, RaciKey, RaciValue};
pub use reconcile::{Confidence, InferenceResult};
pub use store::{ai_configured, AiSettings, MatrixStore};
pub use validate::{ValidationReport, Violation, ViolationKind};

// --- Limits ---

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MAX_ROLE_NAME_LEN: usize = 50;
pub const MAX_TASK_NAME_LEN: usize = 100;
pub const MAX_ROLES: usize = 20;
pub const MAX_TASKS: usize = 50;
pub const MAX_LOGO_BYTES: usize = 2 * 1024 * 1024;
pub const ALLOWED_LOGO_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/svg+xml",
    "image/webp",
    "image/gif",
];

// --- Types ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    /// Display name. Also the matrix column key, so it must stay unique.
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Matrix row key.
    pub id: String,
    pub name: String,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Logo {
    pub mime_type: String,
    pub data: String, // base64-encoded
}

impl Logo {
    /// Validate and encode an uploaded logo. Rejected before any state is touched.
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Result<Self> {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if !ALLOWED_LOGO_TYPES.contains(&mime_type.as_str()) {
            return Err(RaciError::UnsupportedLogoType(mime_type));
        }
        if bytes.len() > MAX_LOGO_BYTES {
            return Err(RaciError::LogoTooLarge {
                size: bytes.len(),
                max: MAX_LOGO_BYTES,
            });
        }
        Ok(Self {
            mime_type,
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// The whole editable document: roles, tasks and the assignment grid.
///
/// Treated as an immutable snapshot. Every operation in this crate returns a
/// new state instead of mutating the one it was given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RaciState {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub roles: Vec<Role>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub matrix: Matrix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<Logo>,
}

impl RaciState {
    pub fn role_by_id(&self, id: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    pub fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn task_by_id(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Build a state from an inference result, keeping the caller's title and description.
    pub fn from_inference(title: &str, description: &str, result: InferenceResult) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            roles: result.roles,
            tasks: result.tasks,
            matrix: result.matrix,
            logo: None,
        }
    }
}

/// Names compare equal when they match case-insensitively after trimming.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// --- Id helpers ---

fn next_numbered_id<'a>(prefix: &str, ids: impl Iterator<Item = &'a str>) -> String {
    let max = ids
        .filter_map(|id| id.strip_prefix(prefix).and_then(|n| n.parse::<u64>().ok()))
        .max()
        .unwrap_or(0);
    format!("{}{}", prefix, max + 1)
}

/// Generate the next role ID by scanning existing roles ("role-{N}").
pub fn next_role_id(roles: &[Role]) -> String {
    next_numbered_id("role-", roles.iter().map(|r| r.id.as_str()))
}

/// Generate the next task ID by scanning existing tasks ("task-{N}").
pub fn next_task_id(tasks: &[Task]) -> String {
    next_numbered_id("task-", tasks.iter().map(|t| t.id.as_str()))
}
