//! Routing of `str_replace_editor` tool calls to editor operations.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::backup::BackupStore;
use super::edit::{create_file, insert_text, str_replace, undo_edit};
use super::view::{view_directory, view_file};
use super::{ToolError, ToolOutcome};
use crate::llm::ToolDefinition;

#[derive(Debug, Default, Deserialize)]
struct ViewParams {
    #[serde(default)]
    view_range: Option<Value>,
    #[serde(default)]
    details: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplaceParams {
    #[serde(default)]
    old_str: Option<String>,
    #[serde(default)]
    new_str: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CreateParams {
    #[serde(default)]
    file_text: Option<String>,
    #[serde(default)]
    overwrite: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct InsertParams {
    #[serde(default)]
    new_str: Option<String>,
    #[serde(default)]
    insert_line: Option<i64>,
    #[serde(default)]
    preserve_newline: Option<bool>,
}

/// The text editor tool bound to a repository root.
#[derive(Debug, Clone)]
pub struct TextEditor {
    root: PathBuf,
    backups: Arc<BackupStore>,
}

impl TextEditor {
    /// Create an editor with a fresh backup store.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backups: Arc::new(BackupStore::new()),
        }
    }

    /// Share an existing backup store.
    pub fn with_backups(mut self, backups: Arc<BackupStore>) -> Self {
        self.backups = backups;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backups(&self) -> &Arc<BackupStore> {
        &self.backups
    }

    /// Tool descriptor to advertise in requests.
    pub fn definition() -> ToolDefinition {
        ToolDefinition::text_editor()
    }

    /// Resolve a model-supplied path against the repository root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Execute one tool call. Never fails: errors become `is_error` outcomes.
    pub fn dispatch(&self, input: &Value) -> ToolOutcome {
        let command = input
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let path = input.get("path").and_then(Value::as_str).unwrap_or_default();
        debug!("Dispatching '{}' on '{}'", command, path);

        let result = self.run(command, path, input);
        if let Err(e) = &result {
            warn!("Tool command '{}' on '{}' failed: {}", command, path, e);
        }
        result.into()
    }

    fn run(&self, command: &str, path: &str, input: &Value) -> Result<String, ToolError> {
        let known = matches!(command, "view" | "str_replace" | "create" | "insert" | "undo_edit");
        if !known {
            return Err(ToolError::invalid_input(format!(
                "Unknown command '{}'",
                command
            )));
        }
        if path.is_empty() {
            return Err(ToolError::invalid_input("'path' is required"));
        }
        let target = self.resolve(path);

        match command {
            "view" => {
                let params: ViewParams = parse_params(command, input)?;
                if target.is_dir() {
                    view_directory(&target, params.details.unwrap_or(false))
                } else if target.is_file() {
                    let range = params.view_range.as_ref().map(parse_view_range).transpose()?;
                    view_file(&target, range)
                } else {
                    Err(ToolError::not_found(&target))
                }
            }
            "str_replace" => {
                let params: ReplaceParams = parse_params(command, input)?;
                let new = params
                    .new_str
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ToolError::invalid_input("'new_str' is required"))?;
                str_replace(
                    &self.backups,
                    &target,
                    params.old_str.as_deref().unwrap_or_default(),
                    &new,
                )
            }
            "create" => {
                let params: CreateParams = parse_params(command, input)?;
                create_file(
                    &self.backups,
                    &target,
                    params.file_text.as_deref().unwrap_or_default(),
                    params.overwrite.unwrap_or(false),
                )
            }
            "insert" => {
                let params: InsertParams = parse_params(command, input)?;
                insert_text(
                    &self.backups,
                    &target,
                    params.new_str.as_deref().unwrap_or_default(),
                    params.insert_line.unwrap_or(0),
                    params.preserve_newline.unwrap_or(true),
                )
            }
            _ => undo_edit(&self.backups, &target),
        }
    }
}

fn parse_params<T: DeserializeOwned>(command: &str, input: &Value) -> Result<T, ToolError> {
    T::deserialize(input).map_err(|e| {
        ToolError::invalid_input(format!("Invalid parameters for '{}': {}", command, e))
    })
}

fn parse_view_range(value: &Value) -> Result<(i64, i64), ToolError> {
    let items = match value.as_array() {
        Some(items) if items.len() == 2 => items,
        _ => {
            return Err(ToolError::invalid_input(
                "view_range must be a list of two integers",
            ))
        }
    };
    match (items[0].as_i64(), items[1].as_i64()) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(ToolError::invalid_input("view_range values must be integers")),
    }
}
