//! Text editor toolset the model uses to change the local filesystem.
//!
//! Every mutating operation registers the file with the [`BackupStore`]
//! before writing and runs [`verify`] afterwards. Failures never escape as
//! errors: the [`TextEditor`] turns them into `is_error` outcomes the model can
//! read and correct.

mod backup;
mod dispatch;
mod edit;
mod verify;
mod view;

pub use backup::{backup_path_for, should_backup, BackupStore, BACKUP_SUFFIX};
pub use dispatch::TextEditor;
pub use edit::{create_file, insert_text, str_replace, undo_edit};
pub use verify::{verify, Verification};
pub use view::{view_directory, view_file};

use std::path::Path;
use thiserror::Error;

/// Recoverable failure of a single tool call.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Missing or malformed parameters
    #[error("{0}")]
    InvalidInput(String),

    #[error("'{path}' does not exist")]
    NotFound { path: String },

    #[error("'{path}' is not a file")]
    NotAFile { path: String },

    #[error("Cannot create file '{path}' because a directory with that name already exists")]
    IsADirectory { path: String },

    #[error("File '{path}' already exists. Set overwrite=true to replace it.")]
    AlreadyExists { path: String },

    #[error("File '{path}' contains binary or non-text content")]
    Binary { path: String },

    #[error("No match found for replacement. Please check your text and try again.")]
    NoMatch,

    #[error("Found {count} matches for replacement text. Please provide more context to make a unique match.\n\n{matches}")]
    AmbiguousMatch { count: usize, matches: String },

    #[error("No backup found for '{path}'")]
    NoBackup { path: String },

    #[error("Failed {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(path: &Path) -> Self {
        Self::NotFound {
            path: path.display().to_string(),
        }
    }

    pub fn not_a_file(path: &Path) -> Self {
        Self::NotAFile {
            path: path.display().to_string(),
        }
    }

    pub fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::InvalidData {
            return Self::Binary {
                path: path.display().to_string(),
            };
        }
        Self::Io {
            action,
            path: path.display().to_string(),
            source,
        }
    }
}

/// Uniform result of one tool invocation, as sent back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(error: &ToolError) -> Self {
        Self {
            content: format!("Error: {}", error),
            is_error: true,
        }
    }
}

impl From<Result<String, ToolError>> for ToolOutcome {
    fn from(result: Result<String, ToolError>) -> Self {
        match result {
            Ok(content) => Self::success(content),
            Err(error) => Self::failure(&error),
        }
    }
}

/// Read a file as UTF-8 text, mapping failures to tool errors.
pub(crate) fn read_text(path: &Path) -> Result<String, ToolError> {
    let bytes = std::fs::read(path).map_err(|e| ToolError::io("reading file", path, e))?;
    String::from_utf8(bytes).map_err(|_| ToolError::Binary {
        path: path.display().to_string(),
    })
}

/// Ensure `path` names an existing regular file.
pub(crate) fn require_file(path: &Path) -> Result<(), ToolError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(ToolError::not_a_file(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ToolError::not_found(path)),
        Err(e) => Err(ToolError::io("accessing", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_outcome_is_prefixed() {
        let outcome = ToolOutcome::failure(&ToolError::NoMatch);
        assert!(outcome.is_error);
        assert!(outcome.content.starts_with("Error: No match found"));
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: ToolOutcome = Ok::<_, ToolError>("done".to_string()).into();
        assert_eq!(ok, ToolOutcome::success("done"));

        let err: ToolOutcome = Err(ToolError::invalid_input("'new_str' is required")).into();
        assert_eq!(err.content, "Error: 'new_str' is required");
    }

    #[test]
    fn test_invalid_data_maps_to_binary() {
        let source = std::io::Error::new(std::io::ErrorKind::InvalidData, "stream did not contain valid UTF-8");
        let err = ToolError::io("reading file", Path::new("img.png"), source);
        assert!(matches!(err, ToolError::Binary { .. }));
    }
}
