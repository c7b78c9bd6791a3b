use thiserror::Error;

use crate::ALLOWED_LOGO_TYPES;

#[derive(Debug, Error)]
pub enum RaciError {
    #[error("cannot rename role to '{0}': a role with that name is already in the matrix")]
    RoleNameCollision(String),

    #[error("invalid RACI value '{0}': use R, A, C, I or an empty value")]
    InvalidValue(String),

    #[error("a role named '{0}' already exists")]
    DuplicateRole(String),

    #[error("a task named '{0}' already exists")]
    DuplicateTask(String),

    #[error("unknown role '{0}'")]
    UnknownRole(String),

    #[error("unknown task '{0}'")]
    UnknownTask(String),

    #[error("{what} must not be empty")]
    Empty { what: &'static str },

    #[error("{what} is {len} characters long, the maximum length is {max}")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("at most {max} {what} are allowed")]
    TooMany { what: &'static str, max: usize },

    #[error("logo is {size} bytes, the maximum file size is {max} bytes")]
    LogoTooLarge { size: usize, max: usize },

    #[error(
        "unsupported logo type '{0}', allowed types are {allowed}",
        allowed = ALLOWED_LOGO_TYPES.join(", ")
    )]
    UnsupportedLogoType(String),

    #[error("shared state is {len} characters long, the maximum is {max}")]
    ShareTooLarge { len: usize, max: usize },

    #[error("failed to restore shared state: {0}")]
    ShareDecode(String),

    #[error("invalid share URL: {0}")]
    InvalidUrl(String),

    #[error("invalid matrix name '{0}': use letters, digits, '-' or '_'")]
    InvalidName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = RaciError> = std::result::Result<T, E>;

/// Reject blank or over-long text, measured in characters.
pub fn check_text(what: &'static str, text: &str, max: usize, allow_empty: bool) -> Result<()> {
    if !allow_empty && text.trim().is_empty() {
        return Err(RaciError::Empty { what });
    }
    let len = text.chars().count();
    if len > max {
        return Err(RaciError::TooLong { what, len, max });
    }
    Ok(())
}
