//! Best-effort post-write checks, chosen by file extension.
//!
//! A verification never blocks or reverts a write. Its message is appended to
//! the tool result so the model can see syntax problems it introduced.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use tree_sitter::{Language, Node, Parser};

/// Outcome of verifying one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub message: String,
    /// A warning or failure was found
    pub has_issue: bool,
}

impl Verification {
    fn ok(message: String) -> Self {
        Self {
            message,
            has_issue: false,
        }
    }

    fn issue(message: String) -> Self {
        Self {
            message,
            has_issue: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Script {
    Python,
    Shell,
}

impl Script {
    fn label(self) -> &'static str {
        match self {
            Self::Python => "Python",
            Self::Shell => "Shell",
        }
    }

    fn language(self) -> Language {
        match self {
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::Shell => tree_sitter_bash::LANGUAGE.into(),
        }
    }
}

/// Verify the file at `path` after a write.
pub fn verify(path: &Path) -> Verification {
    debug!("Verifying changes to file: {}", path.display());

    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(_) => {
            warn!("Verification failed: File '{}' does not exist", path.display());
            return Verification::issue(format!(
                "Verification failed: File '{}' does not exist",
                path.display()
            ));
        }
    };
    if !meta.is_file() {
        return Verification::issue(format!(
            "Verification failed: '{}' is not a file",
            path.display()
        ));
    }
    let size = meta.len();

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("py") => check_script(path, size, Script::Python),
        Some("sh" | "bash") => check_script(path, size, Script::Shell),
        Some("json") => check_json(path, size),
        Some("toml") => check_toml(path, size),
        Some("html" | "htm" | "xml") => check_markup(path, size),
        _ => check_readable(path, size),
    }
}

fn check_script(path: &Path, size: u64, script: Script) -> Verification {
    let label = script.label();
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            return Verification::issue(format!(
                "Verification failed: Error parsing {} file: {}",
                label, e
            ))
        }
    };

    match first_syntax_error(&source, script.language()) {
        Ok(None) => {
            info!("{} syntax check passed for '{}'", label, path.display());
            Verification::ok(format!(
                "Verification successful: {} syntax check passed. File size: {} bytes.",
                label, size
            ))
        }
        Ok(Some(error)) => {
            warn!("{} syntax error in '{}': {}", label, path.display(), error.detail);
            Verification::issue(format!(
                "Verification warning: {} syntax error at line {}, column {}: {}",
                label, error.line, error.column, error.detail
            ))
        }
        Err(e) => Verification::issue(format!(
            "Verification failed: Error parsing {} file: {}",
            label, e
        )),
    }
}

struct SyntaxError {
    line: usize,
    column: usize,
    detail: String,
}

fn first_syntax_error(source: &str, language: Language) -> Result<Option<SyntaxError>, String> {
    let mut parser = Parser::new();
    parser.set_language(&language).map_err(|e| e.to_string())?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| "parser returned no tree".to_string())?;

    let root = tree.root_node();
    if !root.has_error() {
        return Ok(None);
    }

    let node = find_error_node(root).unwrap_or(root);
    let position = node.start_position();
    let detail = if node.is_missing() {
        format!("missing '{}'", node.kind())
    } else {
        let end = node.end_byte().min(node.start_byte() + 40);
        let snippet = source.get(node.start_byte()..end).unwrap_or("").trim();
        if snippet.is_empty() {
            "invalid syntax".to_string()
        } else {
            format!("invalid syntax near '{}'", snippet)
        }
    };

    Ok(Some(SyntaxError {
        line: position.row + 1,
        column: position.column + 1,
        detail,
    }))
}

fn find_error_node(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children.into_iter().find_map(find_error_node)
}

fn check_json(path: &Path, size: u64) -> Verification {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return Verification::issue(format!(
                "Verification failed: Error parsing JSON file: {}",
                e
            ))
        }
    };

    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(_) => {
            info!("JSON syntax check passed for '{}'", path.display());
            Verification::ok(format!(
                "Verification successful: JSON syntax check passed. File size: {} bytes.",
                size
            ))
        }
        Err(e) => {
            warn!("JSON syntax error in '{}': {}", path.display(), e);
            Verification::issue(format!(
                "Verification warning: JSON syntax error at line {}, column {}: {}",
                e.line(),
                e.column(),
                e
            ))
        }
    }
}

fn check_toml(path: &Path, size: u64) -> Verification {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return Verification::issue(format!(
                "Verification failed: Error parsing TOML file: {}",
                e
            ))
        }
    };

    match toml::from_str::<toml::Table>(&content) {
        Ok(_) => {
            info!("TOML syntax check passed for '{}'", path.display());
            Verification::ok(format!(
                "Verification successful: TOML syntax check passed. File size: {} bytes.",
                size
            ))
        }
        Err(e) => {
            let offset = e.span().map(|s| s.start).unwrap_or(0).min(content.len());
            let before = content.get(..offset).unwrap_or("");
            let line = before.matches('\n').count() + 1;
            let column = before.len() - before.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
            warn!("TOML syntax error in '{}': {}", path.display(), e.message());
            Verification::issue(format!(
                "Verification warning: TOML syntax error at line {}, column {}: {}",
                line,
                column,
                e.message()
            ))
        }
    }
}

fn check_markup(path: &Path, size: u64) -> Verification {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return Verification::issue(format!(
                "Verification failed: Error checking HTML file: {}",
                e
            ))
        }
    };

    let opening = content.matches('<').count();
    let closing = content.matches('>').count();
    if opening != closing {
        warn!("HTML tags might be unbalanced in '{}'", path.display());
        return Verification::issue(format!(
            "Verification warning: HTML tags might be unbalanced (found {} opening tags and {} closing tags). File size: {} bytes.",
            opening, closing, size
        ));
    }

    info!("Basic HTML check passed for '{}'", path.display());
    Verification::ok(format!(
        "Verification successful: Basic HTML check passed. File size: {} bytes.",
        size
    ))
}

fn check_readable(path: &Path, size: u64) -> Verification {
    let result = fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()));

    match result {
        Ok(content) => {
            let line_count = content.lines().count();
            info!(
                "File '{}' is readable, contains {} lines",
                path.display(),
                line_count
            );
            Verification::ok(format!(
                "Verification successful: File is readable. Contains {} lines, size: {} bytes.",
                line_count, size
            ))
        }
        // Binary files are valid artifacts; this is a note, not an issue.
        Err(e) => Verification::ok(format!(
            "Verification note: File exists but may not be readable as text: {}",
            e
        )),
    }
}
