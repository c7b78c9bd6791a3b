use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use raci_core::share::{import_shared, share_url};
use raci_core::validate::validate;
use raci_core::{AiSettings, Logo, MatrixStore, RaciKey, RaciState};
use raci_suggest::{generate_title, infer_matrix, InferenceRequest};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod init;

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct NameRequest {
    /// Name of the matrix (letters, digits, '-' or '_')
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetMatrixRequest {
    /// Name of the matrix to create or overwrite
    name: String,
    /// The complete matrix as a JSON string: {title, description, roles: [{id, name}], tasks: [{id, name}], matrix: {taskId: {roleName: {R, A, C, I}}}}. See get_matrix output for the exact schema.
    data: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GenerateMatrixRequest {
    /// Name to save the generated matrix under
    name: String,
    /// Plain-language project description (max 2000 characters)
    description: String,
    /// Title for the matrix. Generated from the description when omitted.
    title: Option<String>,
    /// Roles the result should use, e.g. ["Product Owner", "Developer"]
    seed_roles: Option<Vec<String>>,
    /// Answers to follow-up questions from an earlier generation, keyed by question
    previous_answers: Option<BTreeMap<String, String>>,
    /// Merge into the existing matrix of this name instead of replacing it. Cells already set are never overwritten.
    keep_existing_data: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetDetailsRequest {
    name: String,
    /// New title (max 100 characters)
    title: Option<String>,
    /// New description (max 2000 characters)
    description: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetLogoRequest {
    name: String,
    /// Path to a PNG, JPEG, SVG, WebP or GIF file (max 2 MiB). Omit to remove the logo.
    path: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddRolesRequest {
    name: String,
    /// Role names to add, e.g. ["Designer"]. Names are case-insensitively unique.
    roles: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RenameRoleRequest {
    name: String,
    /// ID of the role (e.g. "role-2")
    role_id: String,
    new_name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RemoveRolesRequest {
    name: String,
    /// IDs of the roles to remove. Their assignments are removed with them.
    role_ids: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddTasksRequest {
    name: String,
    /// Task names to add, e.g. ["Security Review"]
    tasks: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RenameTaskRequest {
    name: String,
    /// ID of the task (e.g. "task-3")
    task_id: String,
    new_name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RemoveTasksRequest {
    name: String,
    task_ids: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CellItem {
    /// ID of the task (e.g. "task-1")
    task_id: String,
    /// Role *name* (cells are keyed by role name)
    role: String,
    /// "R", "A", "C", "I" (or the full word), or "" to clear the cell
    value: String,
    /// Toggle instead of set: clears the cell if the value is already selected
    toggle: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetCellsRequest {
    name: String,
    cells: Vec<CellItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ShareMatrixRequest {
    name: String,
    /// Base URL of the viewer, e.g. "https://raci.example/app"
    base_url: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ImportSharedRequest {
    /// Name to save the imported matrix under
    name: String,
    /// A share link, or just the value of its `share` parameter
    link: String,
}

// --- Server ---

#[derive(Clone)]
pub struct RaciServer {
    tool_router: ToolRouter<Self>,
    store: MatrixStore,
    settings: AiSettings,
}

#[tool_router]
impl RaciServer {
    pub fn new(store: MatrixStore, settings: AiSettings) -> Self {
        Self {
            tool_router: Self::tool_router(),
            store,
            settings,
        }
    }

    /// Read, apply `edit`, write. Nothing is written when `edit` fails.
    fn edit(
        &self,
        name: &str,
        edit: impl FnOnce(&RaciState) -> raci_core::Result<RaciState>,
    ) -> Result<CallToolResult, McpError> {
        let state = match self.store.read(name) {
            Ok(s) => s,
            Err(e) => return fail(format!("Failed to read matrix '{}': {}", name, e)),
        };
        let next = match edit(&state) {
            Ok(s) => s,
            Err(e) => return fail(e),
        };
        if let Err(e) = self.store.write(name, &next) {
            return fail(format!("Failed to save matrix '{}': {}", name, e));
        }
        success(summary(name, &next))
    }

    #[tool(description = "List all saved RACI matrices")]
    fn list_matrices(&self) -> Result<CallToolResult, McpError> {
        match self.store.list() {
            Ok(names) => {
                let text = if names.is_empty() {
                    "No matrices found. Use generate_matrix or set_matrix to create one.".to_string()
                } else {
                    names.join("\n")
                };
                success(text)
            }
            Err(e) => fail(e),
        }
    }

    #[tool(
        description = "Get the full JSON content of a matrix: {title, description, roles: [{id, name}], tasks: [{id, name}], matrix: {taskId: {roleName: {R, A, C, I}}}, logo?}. The matrix is keyed by task ID, then by role NAME. Followed by a compact letter table."
    )]
    fn get_matrix(
        &self,
        Parameters(req): Parameters<NameRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.store.read(&req.name) {
            Ok(state) => {
                let json = to_json(&state)?;
                success(format!("{}\n\n{}", json, render_table(&state)))
            }
            Err(e) => fail(format!("Failed to read matrix '{}': {}", req.name, e)),
        }
    }

    #[tool(
        description = "Create or overwrite a matrix with complete data in one call. Missing cells are laid out empty. Rejected when the data has structural errors (blank or duplicate IDs, over-long names, cells for unknown roles or tasks)."
    )]
    fn set_matrix(
        &self,
        Parameters(req): Parameters<SetMatrixRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state: RaciState = match serde_json::from_str(&req.data) {
            Ok(s) => s,
            Err(e) => return fail(format!("Invalid matrix JSON: {}", e)),
        };
        let state = state.with_missing_cells_filled();
        let schema = raci_core::validate::check_schema(&state);
        if !schema.is_empty() {
            return fail(format!(
                "Matrix not saved:\n{}",
                bullet_list(schema.iter().map(|v| v.message.as_str()))
            ));
        }
        if let Err(e) = self.store.write(&req.name, &state) {
            return fail(e);
        }
        success(summary(&req.name, &state))
    }

    #[tool(description = "Delete a saved matrix")]
    fn delete_matrix(
        &self,
        Parameters(req): Parameters<NameRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.store.delete(&req.name) {
            Ok(()) => success(format!("Deleted '{}'.", req.name)),
            Err(e) => fail(e),
        }
    }

    #[tool(
        description = "Generate a RACI matrix from a project description and save it. Uses the configured AI model (~/.raci/settings.json) and falls back to a rule-based generator when the model is unavailable. Returns the source (ai or fallback), a confidence label, follow-up questions and suggestions. Answer the questions and call again with previous_answers to refine."
    )]
    async fn generate_matrix(
        &self,
        Parameters(req): Parameters<GenerateMatrixRequest>,
    ) -> Result<CallToolResult, McpError> {
        let keep = req.keep_existing_data.unwrap_or(false);
        let existing = if keep && self.store.exists(&req.name) {
            match self.store.read(&req.name) {
                Ok(s) => Some(s),
                Err(e) => return fail(format!("Failed to read matrix '{}': {}", req.name, e)),
            }
        } else {
            None
        };

        let mut request = InferenceRequest::new(req.description.as_str());
        request.seed_roles = req.seed_roles.unwrap_or_default();
        request.previous_answers = req.previous_answers.unwrap_or_default();
        request.existing = existing.clone();
        request.keep_existing_data = keep;

        let generated = match infer_matrix(&request, &self.settings).await {
            Ok(g) => g,
            Err(e) => return fail(e),
        };

        let title = match (req.title, &existing) {
            (Some(t), _) => t,
            (None, Some(e)) => e.title.clone(),
            (None, None) => generate_title(&req.description, &self.settings).await,
        };
        let base = existing.unwrap_or_else(|| RaciState::new("", "", vec![], vec![]));
        let state = match generated
            .apply_to(&base)
            .with_title(&title)
            .and_then(|s| s.with_description(&req.description))
        {
            Ok(s) => s,
            Err(e) => return fail(e),
        };
        if let Err(e) = self.store.write(&req.name, &state) {
            return fail(e);
        }
        info!(matrix = %req.name, source = ?generated.source, "generated matrix");

        let report = serde_json::json!({
            "source": generated.source,
            "confidence": generated.result.confidence,
            "followUpQuestions": generated.result.follow_up_questions,
            "suggestions": generated.result.suggestions,
        });
        success(format!("{}\n\n{}", summary(&req.name, &state), to_json(&report)?))
    }

    #[tool(description = "Change the title and/or description of a matrix")]
    fn set_details(
        &self,
        Parameters(req): Parameters<SetDetailsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit(&req.name, |state| {
            let mut next = state.clone();
            if let Some(title) = &req.title {
                next = next.with_title(title)?;
            }
            if let Some(description) = &req.description {
                next = next.with_description(description)?;
            }
            Ok(next)
        })
    }

    #[tool(description = "Attach a logo image to a matrix, or remove it when no path is given")]
    fn set_logo(
        &self,
        Parameters(req): Parameters<SetLogoRequest>,
    ) -> Result<CallToolResult, McpError> {
        let logo = match &req.path {
            Some(path) => {
                let bytes = match std::fs::read(path) {
                    Ok(b) => b,
                    Err(e) => return fail(format!("Failed to read '{}': {}", path, e)),
                };
                match Logo::from_bytes(&bytes, mime_for_path(path)) {
                    Ok(logo) => Some(logo),
                    Err(e) => return fail(e),
                }
            }
            None => None,
        };
        self.edit(&req.name, |state| {
            Ok(match logo {
                Some(logo) => state.with_logo(logo),
                None => state.without_logo(),
            })
        })
    }

    #[tool(description = "Add one or more roles. Each new role gets an empty cell on every task.")]
    fn add_roles(
        &self,
        Parameters(req): Parameters<AddRolesRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit(&req.name, |state| {
            req.roles
                .iter()
                .try_fold(state.clone(), |s, role| s.with_role_added(role))
        })
    }

    #[tool(
        description = "Rename a role. Its assignments move with it. Refused when another role already has the new name (case-insensitive)."
    )]
    fn rename_role(
        &self,
        Parameters(req): Parameters<RenameRoleRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit(&req.name, |state| {
            state.with_role_renamed(&req.role_id, &req.new_name)
        })
    }

    #[tool(description = "Remove one or more roles by ID, with all their assignments")]
    fn remove_roles(
        &self,
        Parameters(req): Parameters<RemoveRolesRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit(&req.name, |state| {
            req.role_ids
                .iter()
                .try_fold(state.clone(), |s, id| s.with_role_removed(id))
        })
    }

    #[tool(description = "Add one or more tasks. Each new task gets an empty cell for every role.")]
    fn add_tasks(
        &self,
        Parameters(req): Parameters<AddTasksRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit(&req.name, |state| {
            req.tasks
                .iter()
                .try_fold(state.clone(), |s, task| s.with_task_added(task))
        })
    }

    #[tool(description = "Rename a task. Its ID and assignments are unchanged.")]
    fn rename_task(
        &self,
        Parameters(req): Parameters<RenameTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit(&req.name, |state| {
            state.with_task_renamed(&req.task_id, &req.new_name)
        })
    }

    #[tool(description = "Remove one or more tasks by ID, with all their assignments")]
    fn remove_tasks(
        &self,
        Parameters(req): Parameters<RemoveTasksRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit(&req.name, |state| {
            req.task_ids
                .iter()
                .try_fold(state.clone(), |s, id| s.with_task_removed(id))
        })
    }

    #[tool(
        description = "Set one or more cells. Selecting a value replaces whatever the cell held (one letter per cell). All cells are applied or none."
    )]
    fn set_cells(
        &self,
        Parameters(req): Parameters<SetCellsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.edit(&req.name, |state| {
            req.cells.iter().try_fold(state.clone(), |s, cell| {
                let value = cell.value.trim();
                if value.is_empty() {
                    return s.with_cell_cleared(&cell.task_id, &cell.role);
                }
                let key = RaciKey::parse(value).ok_or_else(|| {
                    raci_core::RaciError::InvalidValue(value.to_string())
                })?;
                s.with_cell(&cell.task_id, &cell.role, key, cell.toggle.unwrap_or(false))
            })
        })
    }

    #[tool(
        description = "Check a matrix against the RACI rules: exactly one Accountable per task, one letter per cell, unique role and task names, and structural consistency"
    )]
    fn validate_matrix(
        &self,
        Parameters(req): Parameters<NameRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.store.read(&req.name) {
            Ok(state) => {
                let report = validate(&state);
                if report.is_valid() {
                    success("No violations.")
                } else {
                    success(to_json(&report.violations)?)
                }
            }
            Err(e) => fail(format!("Failed to read matrix '{}': {}", req.name, e)),
        }
    }

    #[tool(description = "Build a compact share link carrying the whole matrix")]
    fn share_matrix(
        &self,
        Parameters(req): Parameters<ShareMatrixRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = match self.store.read(&req.name) {
            Ok(s) => s,
            Err(e) => return fail(format!("Failed to read matrix '{}': {}", req.name, e)),
        };
        match share_url(&req.base_url, &state) {
            Ok(url) => success(url),
            Err(e) => fail(e),
        }
    }

    #[tool(
        description = "Import a matrix from a share link (current or legacy format) and save it under a name"
    )]
    fn import_shared(
        &self,
        Parameters(req): Parameters<ImportSharedRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = match import_shared(&req.link) {
            Ok(s) => s.with_missing_cells_filled(),
            Err(e) => return fail(e),
        };
        if let Err(e) = self.store.write(&req.name, &state) {
            return fail(e);
        }
        success(summary(&req.name, &state))
    }

    #[tool(description = "Get the RACI rules that a well-formed matrix follows")]
    fn get_rules(&self) -> Result<CallToolResult, McpError> {
        success(raci_core::rules::RULES)
    }
}

#[tool_handler]
impl ServerHandler for RaciServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!("{}\n\n## RACI Rules\n{}", INSTRUCTIONS, raci_core::rules::RULES);
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn success(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text.into())]))
}

fn fail(e: impl Display) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, McpError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))
}

fn bullet_list<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    lines.map(|l| format!("- {}", l)).collect::<Vec<_>>().join("\n")
}

/// One-paragraph outcome of a write, with any rule violations listed.
fn summary(name: &str, state: &RaciState) -> String {
    let report = validate(state);
    let mut out = format!(
        "Saved '{}' ({}): {} roles, {} tasks.",
        name,
        state.title,
        state.roles.len(),
        state.tasks.len()
    );
    if report.is_valid() {
        out.push_str(" No violations.");
    } else {
        out.push_str(&format!(
            " {} violation(s):\n{}",
            report.violations.len(),
            bullet_list(report.violations.iter().map(|v| v.message.as_str()))
        ));
    }
    out
}

/// Letters-only grid, one row per task.
fn render_table(state: &RaciState) -> String {
    let names: Vec<&str> = state.roles.iter().map(|r| r.name.as_str()).collect();
    let mut out = format!("| Task | {} |\n", names.join(" | "));
    out.push_str(&format!("|---|{}\n", "---|".repeat(state.roles.len())));
    for task in &state.tasks {
        let cells: Vec<String> = state
            .roles
            .iter()
            .map(|r| {
                let value = state.matrix.cell(&task.id, &r.name);
                RaciKey::PRIORITY
                    .into_iter()
                    .filter(|k| value.is_set(*k))
                    .map(|k| k.letter())
                    .collect::<String>()
            })
            .collect();
        out.push_str(&format!("| {} ({}) | {} |\n", task.name, task.id, cells.join(" | ")));
    }
    out
}

fn mime_for_path(path: &str) -> &'static str {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

const INSTRUCTIONS: &str = r#"raci is a RACI matrix builder. A matrix assigns each role one of Responsible (R), Accountable (A), Consulted (C) or Informed (I) on each task. Matrices are stored as JSON files under ~/.raci/.

## Data model
- Roles: [{id, name}] with IDs like "role-1". Role names are case-insensitively unique.
- Tasks: [{id, name}] with IDs like "task-1". Task names are case-insensitively unique.
- Matrix: {taskId: {roleName: {R, A, C, I}}}. Cells are keyed by task ID and role NAME. Every task has a cell for every role.

## Workflow
1. `generate_matrix` from a description. Read the follow-up questions; answer them with `previous_answers` and `keep_existing_data: true` to refine without losing edits.
2. Adjust with `add_roles`, `add_tasks`, `set_cells`, `rename_role`, and so on. Every edit is checked and applied in full or not at all.
3. Call `validate_matrix` and fix what it reports. Every task needs exactly one Accountable.
4. `share_matrix` produces a link; `import_shared` reads one back."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the MCP transport
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if std::env::args().nth(1).as_deref() == Some("init") {
        return Ok(init::run()?);
    }

    let store = MatrixStore::default_location();
    let settings = store.read_settings();
    info!(
        root = %store.root().display(),
        ai = raci_core::ai_configured(&settings),
        "starting raci MCP server"
    );

    let service = RaciServer::new(store, settings)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}
