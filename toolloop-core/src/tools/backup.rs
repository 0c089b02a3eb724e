//! One-shot-per-session `.backup` copies taken before a file is first mutated.

use glob::Pattern;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::{debug, info};

use super::ToolError;

/// Suffix appended to a file path to name its backup.
pub const BACKUP_SUFFIX: &str = ".backup";

/// Directory names whose contents are never backed up.
const EXCLUDED_DIRS: &[&str] = &[
    ".venv",
    "__pycache__",
    "node_modules",
    ".git",
    ".pytest_cache",
    ".mypy_cache",
    "target",
];

/// File name patterns that are never backed up.
const EXCLUDED_FILE_PATTERNS: &[&str] = &["*.pyc", "*.pyo", "*.pyd", "*.so", "*.dll", "*.backup"];

fn excluded_file_patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        EXCLUDED_FILE_PATTERNS
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect()
    })
}

/// Path of the backup copy for `path`.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Whether `path` is eligible for backup at all.
pub fn should_backup(path: &Path) -> bool {
    let in_excluded_dir = path.components().any(|c| match c {
        Component::Normal(name) => name
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name)),
        _ => false,
    });
    if in_excluded_dir {
        return false;
    }

    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => !excluded_file_patterns().iter().any(|p| p.matches(name)),
        None => true,
    }
}

/// Registry key for `path`: the canonical path when the file exists, so
/// aliases such as `sub/../x.txt` or symlinks share one entry.
fn registry_key(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Registry of files backed up during this session.
///
/// The first registration of a path copies it to `<path>.backup`; later
/// registrations are no-ops, so `restore` always returns the file to its
/// state before the session first touched it.
#[derive(Debug, Default)]
pub struct BackupStore {
    registry: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl BackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, PathBuf>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Back up `path` if this is the first mutation of it in this session.
    ///
    /// Returns `true` only when a fresh backup was written. Paths that do not
    /// exist yet or are excluded are successful no-ops.
    pub fn register_for_backup(&self, path: &Path) -> Result<bool, ToolError> {
        let key = registry_key(path);
        let mut registry = self.lock();

        if registry.contains_key(&key) {
            debug!("Backup already taken this session for {}", key.display());
            return Ok(false);
        }
        if !should_backup(&key) {
            debug!("Skipping backup of excluded path {}", key.display());
            return Ok(false);
        }

        match fs::metadata(&key) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(ToolError::not_a_file(path)),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(ToolError::io("backing up", path, e)),
        }

        let backup = backup_path_for(&key);
        fs::copy(&key, &backup).map_err(|e| ToolError::io("backing up", path, e))?;
        info!("Backed up {} to {}", key.display(), backup.display());
        registry.insert(key, backup);
        Ok(true)
    }

    /// Overwrite `path` with its backup copy.
    pub fn restore(&self, path: &Path) -> Result<(), ToolError> {
        let backup = backup_path_for(&registry_key(path));
        if !backup.is_file() {
            return Err(ToolError::NoBackup {
                path: path.display().to_string(),
            });
        }

        fs::copy(&backup, path).map_err(|e| ToolError::io("restoring", path, e))?;
        info!("Restored {} from {}", path.display(), backup.display());
        Ok(())
    }

    /// Whether `path` was backed up during this session.
    pub fn is_registered(&self, path: &Path) -> bool {
        self.lock().contains_key(&registry_key(path))
    }

    /// Number of files backed up during this session.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
