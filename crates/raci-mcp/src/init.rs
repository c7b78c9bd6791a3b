//! `raci-mcp init`: register the server with the agent CLIs installed on this
//! machine, in project-scoped config files under the current directory.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use thiserror::Error;
use toml_edit::{DocumentMut, Item, Table};
use tracing::info;

/// Key the server is registered under in every agent config.
pub const SERVER_NAME: &str = "raci";

#[derive(Debug, Error)]
pub enum InitError {
    #[error("neither `claude` nor `codex` is on PATH; install one of them and run `raci-mcp init` again")]
    NoAgents,

    #[error("{file} is not valid JSON, fix or remove it first: {source}", file = .path.display())]
    BadJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{file} is not valid TOML, fix or remove it first: {source}", file = .path.display())]
    BadToml {
        path: PathBuf,
        source: toml_edit::TomlError,
    },

    #[error("{file}: `{key}` is not a table", file = .path.display())]
    NotATable { path: PathBuf, key: &'static str },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agent {
    ClaudeCode,
    Codex,
}

impl Agent {
    pub const ALL: [Agent; 2] = [Agent::ClaudeCode, Agent::Codex];

    fn program(self) -> &'static str {
        match self {
            Agent::ClaudeCode => "claude",
            Agent::Codex => "codex",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Agent::ClaudeCode => "Claude Code",
            Agent::Codex => "Codex",
        }
    }

    pub fn config_path(self, project: &Path) -> PathBuf {
        match self {
            Agent::ClaudeCode => project.join(".mcp.json"),
            Agent::Codex => project.join(".codex").join("config.toml"),
        }
    }

    /// `existing` with the raci entry added or replaced. Other entries are kept.
    fn register(self, existing: &str, path: &Path, command: &str) -> Result<String, InitError> {
        match self {
            Agent::ClaudeCode => register_json(existing, path, command),
            Agent::Codex => register_toml(existing, path, command),
        }
    }
}

fn register_json(existing: &str, path: &Path, command: &str) -> Result<String, InitError> {
    let mut root = if existing.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str::<Value>(existing).map_err(|source| InitError::BadJson {
            path: path.to_path_buf(),
            source,
        })?
    };
    let not_a_table = |key: &'static str| InitError::NotATable {
        path: path.to_path_buf(),
        key,
    };
    let servers = root
        .as_object_mut()
        .ok_or_else(|| not_a_table("(document)"))?
        .entry("mcpServers")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| not_a_table("mcpServers"))?;
    servers.insert(
        SERVER_NAME.to_string(),
        json!({ "type": "stdio", "command": command, "args": [] }),
    );
    Ok(serde_json::to_string_pretty(&root)? + "\n")
}

fn register_toml(existing: &str, path: &Path, command: &str) -> Result<String, InitError> {
    let mut doc: DocumentMut = existing.parse().map_err(|source| InitError::BadToml {
        path: path.to_path_buf(),
        source,
    })?;
    let servers = doc
        .entry("mcp_servers")
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .ok_or_else(|| InitError::NotATable {
            path: path.to_path_buf(),
            key: "mcp_servers",
        })?;

    let mut server = Table::new();
    server.insert("command", toml_edit::value(command));
    server.insert("args", toml_edit::value(toml_edit::Array::new()));
    servers.insert(SERVER_NAME, Item::Table(server));
    Ok(doc.to_string())
}

fn read_if_present(path: &Path) -> Result<String, InitError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

fn on_path(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        dir.join(program).is_file() || dir.join(format!("{program}.exe")).is_file()
    })
}

/// Register `command` for each of `agents` under `project`.
///
/// Every config is prepared before any is written, so one unreadable file
/// leaves all of them as they were.
pub fn install(project: &Path, command: &str, agents: &[Agent]) -> Result<Vec<PathBuf>, InitError> {
    if agents.is_empty() {
        return Err(InitError::NoAgents);
    }
    let mut pending = Vec::with_capacity(agents.len());
    for &agent in agents {
        let path = agent.config_path(project);
        let contents = agent.register(&read_if_present(&path)?, &path, command)?;
        pending.push((path, contents));
    }
    let mut written = Vec::with_capacity(pending.len());
    for (path, contents) in pending {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, contents)?;
        written.push(path);
    }
    Ok(written)
}

/// Entry point for `raci-mcp init` in the current directory.
pub fn run() -> Result<(), InitError> {
    let command = std::env::current_exe()?
        .canonicalize()?
        .to_string_lossy()
        .into_owned();
    let project = std::env::current_dir()?;
    let agents: Vec<Agent> = Agent::ALL
        .into_iter()
        .filter(|a| on_path(a.program()))
        .collect();

    for path in install(&project, &command, &agents)? {
        info!(path = %path.display(), "registered MCP server");
    }
    let labels: Vec<&str> = agents.iter().map(|a| a.label()).collect();
    info!("{} will use raci in this project", labels.join(" and "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIN: &str = "/usr/bin/raci-mcp";

    #[test]
    fn registers_next_to_existing_servers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".mcp.json"), r#"{"mcpServers":{"other":{}}}"#).unwrap();

        let written = install(dir.path(), BIN, &Agent::ALL).unwrap();
        assert_eq!(written.len(), 2);

        let mcp: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(".mcp.json")).unwrap())
                .unwrap();
        assert_eq!(mcp["mcpServers"]["raci"]["command"], BIN);
        assert!(mcp["mcpServers"]["other"].is_object());
        let toml = std::fs::read_to_string(Agent::Codex.config_path(dir.path())).unwrap();
        assert!(toml.contains("[mcp_servers.raci]"));
    }

    #[test]
    fn rerunning_replaces_only_the_raci_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = Agent::Codex.config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "model = \"o3\"\n\n[mcp_servers.raci]\ncommand = \"/old\"\n").unwrap();

        install(dir.path(), BIN, &[Agent::Codex]).unwrap();
        let toml = std::fs::read_to_string(&path).unwrap();
        assert!(toml.contains("model = \"o3\""));
        assert!(toml.contains(BIN));
        assert!(!toml.contains("/old"));
    }

    #[test]
    fn malformed_config_is_refused_and_nothing_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let mcp = dir.path().join(".mcp.json");
        std::fs::write(&mcp, "{ \"mcpServers\": ").unwrap();

        let err = install(dir.path(), BIN, &Agent::ALL).unwrap_err();
        assert!(matches!(err, InitError::BadJson { .. }), "{err}");
        assert_eq!(std::fs::read_to_string(&mcp).unwrap(), "{ \"mcpServers\": ");
        assert!(!Agent::Codex.config_path(dir.path()).exists());
    }

    #[test]
    fn malformed_toml_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = Agent::Codex.config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[mcp_servers\n").unwrap();

        let err = install(dir.path(), BIN, &[Agent::Codex]).unwrap_err();
        assert!(matches!(err, InitError::BadToml { .. }), "{err}");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[mcp_servers\n");
    }

    #[test]
    fn servers_key_of_the_wrong_type_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".mcp.json"), r#"{"mcpServers":[]}"#).unwrap();
        let err = install(dir.path(), BIN, &[Agent::ClaudeCode]).unwrap_err();
        assert!(matches!(err, InitError::NotATable { key: "mcpServers", .. }), "{err}");
    }

    #[test]
    fn no_agents_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(install(dir.path(), BIN, &[]), Err(InitError::NoAgents)));
    }
}
