//! Mutating editor operations.
//!
//! Each operation validates first, registers the file with the backup store
//! just before writing, then appends the verifier's message to its result.
//! A failed validation or backup leaves the file untouched.

use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::backup::BackupStore;
use super::verify::verify;
use super::{read_text, require_file, ToolError};

/// Lines of context shown around each ambiguous match.
const MATCH_CONTEXT_LINES: usize = 2;

/// Most empty lines an insert past the end of a file may add.
pub const MAX_INSERT_PADDING: usize = 10_000;

fn write_text(path: &Path, content: &str) -> Result<(), ToolError> {
    fs::write(path, content).map_err(|e| ToolError::io("writing to file", path, e))
}

/// Create `path` with `text`, replacing an existing file only with `overwrite`.
pub fn create_file(
    backups: &BackupStore,
    path: &Path,
    text: &str,
    overwrite: bool,
) -> Result<String, ToolError> {
    let existed = match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {
            return Err(ToolError::IsADirectory {
                path: path.display().to_string(),
            })
        }
        Ok(_) if !overwrite => {
            return Err(ToolError::AlreadyExists {
                path: path.display().to_string(),
            })
        }
        Ok(_) => true,
        Err(_) => false,
    };

    if existed {
        backups.register_for_backup(path)?;
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ToolError::io("creating directory", parent, e))?;
    }
    write_text(path, text)?;

    let action = if existed { "updated" } else { "created" };
    info!("File {} {} ({} bytes)", path.display(), action, text.len());
    let verification = verify(path);
    Ok(format!(
        "File '{}' {} successfully.\n{}",
        path.display(),
        action,
        verification.message
    ))
}

/// Replace the single occurrence of `old` in `path` with `new`.
///
/// Returns the new file content followed by the verification message.
pub fn str_replace(
    backups: &BackupStore,
    path: &Path,
    old: &str,
    new: &str,
) -> Result<String, ToolError> {
    require_file(path)?;
    if old.is_empty() {
        return Err(ToolError::invalid_input("'old_str' cannot be empty"));
    }
    let content = read_text(path)?;

    let positions: Vec<usize> = content.match_indices(old).map(|(pos, _)| pos).collect();
    match positions.len() {
        0 => return Err(ToolError::NoMatch),
        1 => {}
        count => {
            debug!("{} matches for replacement in {}", count, path.display());
            return Err(ToolError::AmbiguousMatch {
                count,
                matches: describe_matches(&content, old, &positions),
            });
        }
    }

    backups.register_for_backup(path)?;
    let updated = content.replacen(old, new, 1);
    write_text(path, &updated)?;
    info!("Replaced text in {}", path.display());

    let verification = verify(path);
    Ok(format!("{}\n\n{}", updated, verification.message))
}

fn describe_matches(content: &str, old: &str, positions: &[usize]) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let last = lines.len().saturating_sub(1);

    positions
        .iter()
        .enumerate()
        .map(|(i, &pos)| {
            let first_line = content[..pos].matches('\n').count();
            let end_line = content[..pos + old.len()].matches('\n').count();
            let from = first_line.saturating_sub(MATCH_CONTEXT_LINES);
            let to = (end_line + MATCH_CONTEXT_LINES).min(last);
            format!(
                "Match #{} (line {}):\n{}",
                i + 1,
                first_line + 1,
                lines[from..=to].join("\n")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Insert `text` after line `after_line` of `path` (0 inserts at the start).
///
/// Inserting past the end pads the file with empty lines. With
/// `preserve_newline`, a trailing newline is added to `text` if missing.
pub fn insert_text(
    backups: &BackupStore,
    path: &Path,
    text: &str,
    after_line: i64,
    preserve_newline: bool,
) -> Result<String, ToolError> {
    require_file(path)?;
    let line = usize::try_from(after_line).map_err(|_| {
        ToolError::invalid_input(format!(
            "Insert line number ({}) cannot be negative",
            after_line
        ))
    })?;
    let content = read_text(path)?;

    let mut lines: Vec<String> = content.split_inclusive('\n').map(str::to_string).collect();
    if line > lines.len() {
        let padding = line - lines.len();
        if padding > MAX_INSERT_PADDING {
            return Err(ToolError::invalid_input(format!(
                "Insert line number ({}) is too far past the end of the file ({} lines); at most {} lines of padding are allowed",
                after_line,
                lines.len(),
                MAX_INSERT_PADDING
            )));
        }
        terminate_last(&mut lines);
        lines.resize(line, "\n".to_string());
    } else if line > 0 && line == lines.len() {
        terminate_last(&mut lines);
    }

    let mut inserted = text.to_string();
    if preserve_newline && !inserted.is_empty() && !inserted.ends_with('\n') {
        inserted.push('\n');
    }

    backups.register_for_backup(path)?;
    lines.insert(line, inserted);
    let updated = lines.concat();
    write_text(path, &updated)?;

    let total = updated.split_inclusive('\n').count();
    let position = if line == 0 {
        "beginning of file".to_string()
    } else {
        format!("after line {}", line)
    };
    info!("Inserted text {} in {}", position, path.display());

    let verification = verify(path);
    Ok(format!(
        "Text inserted at {} in '{}' (now {} lines total).\n{}",
        position,
        path.display(),
        total,
        verification.message
    ))
}

fn terminate_last(lines: &mut [String]) {
    if let Some(last) = lines.last_mut() {
        if !last.ends_with('\n') {
            last.push('\n');
        }
    }
}

/// Restore `path` from its `.backup` copy.
pub fn undo_edit(backups: &BackupStore, path: &Path) -> Result<String, ToolError> {
    backups.restore(path)?;
    Ok(format!(
        "File '{}' successfully restored from backup.",
        path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::backup_path_for;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn file_with(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_create_new_file_with_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pkg/sub/mod.py");
        let store = BackupStore::new();

        let message = create_file(&store, &path, "x = 1\n", false).unwrap();
        assert!(message.starts_with(&format!("File '{}' created successfully.\n", path.display())));
        assert!(message.contains("Python syntax check passed"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "x = 1\n");
        assert!(store.is_empty());
    }

    #[test]
    fn test_create_refuses_existing_without_overwrite() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "keep.txt", "keep");
        let store = BackupStore::new();

        let err = create_file(&store, &path, "new", false).unwrap_err();
        assert!(matches!(err, ToolError::AlreadyExists { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep");

        let err = create_file(&store, dir.path(), "new", true).unwrap_err();
        assert!(matches!(err, ToolError::IsADirectory { .. }));
    }

    #[test]
    fn test_overwrite_backs_up_first() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "notes.txt", "before");
        let store = BackupStore::new();

        let message = create_file(&store, &path, "after", true).unwrap();
        assert!(message.contains("updated successfully"));
        assert_eq!(fs::read_to_string(backup_path_for(&path)).unwrap(), "before");
        assert_eq!(fs::read_to_string(&path).unwrap(), "after");
    }

    #[test]
    fn test_replace_single_match() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "app.py", "def f():\n    return 1\n");
        let store = BackupStore::new();

        let result = str_replace(&store, &path, "return 1", "return 2").unwrap();
        assert!(result.starts_with("def f():\n    return 2\n\n\n"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "def f():\n    return 2\n");
        assert!(store.is_registered(&path));
    }

    #[test]
    fn test_replace_without_match_leaves_file() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "a.txt", "alpha\n");
        let store = BackupStore::new();

        let err = str_replace(&store, &path, "beta", "gamma").unwrap_err();
        assert!(matches!(err, ToolError::NoMatch));
        assert_eq!(fs::read_to_string(&path).unwrap(), "alpha\n");
        assert!(!backup_path_for(&path).exists());
    }

    #[test]
    fn test_replace_ambiguous_lists_context() {
        let dir = tempdir().unwrap();
        let original = "a\nb\nx = 1\nc\nd\ne\nf\nx = 1\ng\n";
        let path = file_with(dir.path(), "dup.py", original);
        let store = BackupStore::new();

        let err = str_replace(&store, &path, "x = 1", "x = 2").unwrap_err();
        let ToolError::AmbiguousMatch { count, matches } = &err else {
            panic!("expected ambiguous match, got {err:?}");
        };
        assert_eq!(*count, 2);
        assert_eq!(
            matches,
            "Match #1 (line 3):\na\nb\nx = 1\nc\nd\n\nMatch #2 (line 8):\ne\nf\nx = 1\ng\n"
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_replace_rejects_empty_old() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "a.txt", "abc");
        let err = str_replace(&BackupStore::new(), &path, "", "x").unwrap_err();
        assert_eq!(err.to_string(), "'old_str' cannot be empty");
    }

    #[test]
    fn test_undo_after_two_replaces_restores_original() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "cfg.txt", "one two three");
        let store = BackupStore::new();

        str_replace(&store, &path, "one", "1").unwrap();
        str_replace(&store, &path, "two", "2").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1 2 three");

        let message = undo_edit(&store, &path).unwrap();
        assert!(message.ends_with("successfully restored from backup."));
        assert_eq!(fs::read_to_string(&path).unwrap(), "one two three");
    }

    #[test]
    fn test_undo_without_backup() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "fresh.txt", "x");
        let err = undo_edit(&BackupStore::new(), &path).unwrap_err();
        assert!(matches!(err, ToolError::NoBackup { .. }));
    }

    #[test]
    fn test_insert_at_beginning() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "list.txt", "b\nc\n");
        let message = insert_text(&BackupStore::new(), &path, "a", 0, true).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\nc\n");
        assert!(message.starts_with(&format!(
            "Text inserted at beginning of file in '{}' (now 3 lines total).",
            path.display()
        )));
    }

    #[test]
    fn test_insert_after_line() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "list.txt", "a\nc");
        insert_text(&BackupStore::new(), &path, "b", 1, true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\nc");

        insert_text(&BackupStore::new(), &path, "d", 3, true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\nc\nd\n");
    }

    #[test]
    fn test_insert_past_end_pads() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "short.txt", "1\n2\n3\n");
        let message = insert_text(&BackupStore::new(), &path, "tail", 10, true).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.lines().count() >= 11);
        assert_eq!(content.lines().nth(10), Some("tail"));
        assert!(message.contains("after line 10"));
    }

    #[test]
    fn test_insert_without_preserving_newline() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "raw.txt", "ab\n");
        insert_text(&BackupStore::new(), &path, "x", 0, false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "xab\n");
    }

    #[test]
    fn test_insert_far_past_end_is_rejected() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "a.txt", "a\n");
        let store = BackupStore::new();

        for line in [i64::MAX, 1_000_000_000, (MAX_INSERT_PADDING + 2) as i64] {
            let err = insert_text(&store, &path, "x", line, true).unwrap_err();
            assert!(matches!(err, ToolError::InvalidInput(_)));
            assert!(err.to_string().contains("too far past the end"));
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\n");
        assert!(!backup_path_for(&path).exists());

        // Exactly at the cap is still accepted.
        insert_text(&store, &path, "x", (MAX_INSERT_PADDING + 1) as i64, true).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), MAX_INSERT_PADDING + 2);
    }

    #[test]
    fn test_insert_rejects_negative_line() {
        let dir = tempdir().unwrap();
        let path = file_with(dir.path(), "a.txt", "a\n");
        let err = insert_text(&BackupStore::new(), &path, "x", -1, true).unwrap_err();
        assert_eq!(err.to_string(), "Insert line number (-1) cannot be negative");
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\n");
    }

    #[test]
    fn test_edits_on_missing_file_fail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ghost.txt");
        let store = BackupStore::new();
        assert!(matches!(
            str_replace(&store, &path, "a", "b"),
            Err(ToolError::NotFound { .. })
        ));
        assert!(matches!(
            insert_text(&store, &path, "a", 0, true),
            Err(ToolError::NotFound { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_unique_replace_round_trips(
            prefix in "[a-z\n]{0,40}",
            suffix in "[a-z\n]{0,40}",
            new in "[A-Z]{1,10}",
        ) {
            let dir = tempdir().unwrap();
            let original = format!("{}#MARK#{}", prefix, suffix);
            let path = file_with(dir.path(), "p.txt", &original);
            let store = BackupStore::new();

            str_replace(&store, &path, "#MARK#", &new).unwrap();
            prop_assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}{}{}", prefix, new, suffix));

            undo_edit(&store, &path).unwrap();
            prop_assert_eq!(fs::read_to_string(&path).unwrap(), original);
        }
    }
}
