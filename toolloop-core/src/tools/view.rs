//! Read-only `view` operations.

use chrono::{DateTime, Local};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::{read_text, require_file, ToolError};

/// Return the lines of `path` within `range`, 1-indexed and inclusive.
///
/// `None` returns the whole file. An end of `-1` means end of file; ranges
/// past the file are clipped.
pub fn view_file(path: &Path, range: Option<(i64, i64)>) -> Result<String, ToolError> {
    require_file(path)?;
    let content = read_text(path)?;

    let Some((start, end)) = range else {
        return Ok(content);
    };
    if end < -1 {
        return Err(ToolError::invalid_input(format!(
            "Invalid view_range end ({}): use -1 to read to the end of the file",
            end
        )));
    }
    if end != -1 && end < start {
        return Err(ToolError::invalid_input(format!(
            "Invalid view_range [{}, {}]: end must not be before start",
            start, end
        )));
    }

    let skip = usize::try_from(start.saturating_sub(1)).unwrap_or(0);
    let lines = content.split_inclusive('\n').skip(skip);
    let selected: String = if end == -1 {
        lines.collect()
    } else {
        let take = usize::try_from(end).unwrap_or(0).saturating_sub(skip);
        lines.take(take).collect()
    };

    debug!(
        "Viewed {} lines {}..{} ({} bytes)",
        path.display(),
        start,
        end,
        selected.len()
    );
    Ok(selected)
}

/// Render a sorted listing of `path`.
pub fn view_directory(path: &Path, details: bool) -> Result<String, ToolError> {
    let meta = fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ToolError::not_found(path),
        _ => ToolError::io("accessing directory", path, e),
    })?;
    if !meta.is_dir() {
        return Err(ToolError::invalid_input(format!(
            "'{}' is not a directory",
            path.display()
        )));
    }

    let mut names: Vec<String> = fs::read_dir(path)
        .map_err(|e| ToolError::io("listing directory", path, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    if names.is_empty() {
        return Ok(format!("{} (empty directory)", path.display()));
    }

    let mut total_size = 0u64;
    let mut lines = Vec::with_capacity(names.len());
    for name in &names {
        let full = path.join(name);
        if let Ok(meta) = fs::metadata(&full) {
            if meta.is_file() {
                total_size += meta.len();
            }
        }
        lines.push(if details {
            detailed_entry(&full, name)
        } else {
            simple_entry(&full, name)
        });
    }

    debug!("Listed {} ({} entries)", path.display(), names.len());
    Ok(format!(
        "{} ({} items, {} total):\n{}",
        path.display(),
        names.len(),
        format_size(total_size),
        lines.join("\n")
    ))
}

fn simple_entry(full: &Path, name: &str) -> String {
    if full.is_dir() {
        format!("- {}/ (dir)", name)
    } else if full.is_symlink() {
        format!("- {} (link)", name)
    } else {
        format!("- {}", name)
    }
}

fn detailed_entry(full: &Path, name: &str) -> String {
    let Ok(meta) = fs::metadata(full) else {
        return format!("- {} (inaccessible)", name);
    };
    let modified = meta
        .modified()
        .map(|t| {
            DateTime::<Local>::from(t)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|_| "unknown".to_string());

    let (kind, size) = if meta.is_dir() {
        let items = fs::read_dir(full).map(|d| d.count()).unwrap_or(0);
        ("directory", format!("{} items", items))
    } else if full.is_symlink() {
        ("symlink", format!("{} bytes", meta.len()))
    } else {
        ("file", format_size(meta.len()))
    };

    format!("- {} ({}, {}, modified: {})", name, kind, size, modified)
}

/// Human-readable size with one decimal above a kilobyte.
fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let size = bytes as f64;
    if size < KB {
        format!("{} bytes", bytes)
    } else if size < KB * KB {
        format!("{:.1} KB", size / KB)
    } else if size < KB * KB * KB {
        format!("{:.1} MB", size / (KB * KB))
    } else {
        format!("{:.1} GB", size / (KB * KB * KB))
    }
}
