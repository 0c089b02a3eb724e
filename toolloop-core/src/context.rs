//! Context files: a list of paths whose contents are inlined into a prompt.

use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::Result;

/// Text placed before the inlined context.
pub const CONTEXT_PREAMBLE: &str = "Below is relevant context for the task at hand. \
Please use this information to assist in the task. ";

/// Build a prompt prefix from a file listing one path per line.
///
/// Files are inlined, directories are listed, and any other line is kept
/// verbatim. Paths are taken as written, relative to the process directory.
pub fn load_context_file(path: &Path) -> Result<String> {
    let listing = fs::read_to_string(path)?;
    let mut context = CONTEXT_PREAMBLE.to_string();

    for line in listing.lines().map(str::trim) {
        let entry = Path::new(line);
        if !line.is_empty() && entry.is_file() {
            match fs::read(entry) {
                Ok(bytes) => {
                    debug!("Including context file {} ({} bytes)", line, bytes.len());
                    context.push_str(&format!(
                        "\n{} file:\n{}\n\n",
                        line,
                        String::from_utf8_lossy(&bytes)
                    ));
                }
                Err(e) => {
                    warn!("Skipping unreadable context file {}: {}", line, e);
                    context.push_str(&format!("\n{}\n", line));
                }
            }
        } else if !line.is_empty() && entry.is_dir() {
            match fs::read_dir(entry) {
                Ok(read_dir) => {
                    let mut names: Vec<String> = read_dir
                        .filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect();
                    names.sort();
                    context.push_str(&format!("\n{} dir:\n[{}]\n\n", line, names.join(", ")));
                }
                Err(e) => {
                    warn!("Skipping unreadable context directory {}: {}", line, e);
                    context.push_str(&format!("\n{}\n", line));
                }
            }
        } else {
            context.push_str(&format!("\n{}\n", line));
        }
    }

    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_files_dirs_and_notes() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("main.py");
        fs::write(&file, "print(1)\n").unwrap();
        let sub = dir.path().join("pkg");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("b.py"), "").unwrap();
        fs::write(sub.join("a.py"), "").unwrap();

        let listing = dir.path().join("llm.txt");
        fs::write(
            &listing,
            format!("{}\n{}\nFocus on speed.\n", file.display(), sub.display()),
        )
        .unwrap();

        let context = load_context_file(&listing).unwrap();
        let expected = format!(
            "{}\n{} file:\nprint(1)\n\n\n\n{} dir:\n[a.py, b.py]\n\n\nFocus on speed.\n",
            CONTEXT_PREAMBLE,
            file.display(),
            sub.display()
        );
        assert_eq!(context, expected);
    }

    #[test]
    fn test_non_utf8_is_lossy() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("latin1.txt");
        fs::write(&file, [b'c', b'a', b'f', 0xe9]).unwrap();
        let listing = dir.path().join("ctx.txt");
        fs::write(&listing, file.display().to_string()).unwrap();

        let context = load_context_file(&listing).unwrap();
        assert!(context.contains("caf\u{fffd}"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_does_not_fail_the_load() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        let file = dir.path().join("notes.md");
        fs::write(&file, "keep going\n").unwrap();
        let listing = dir.path().join("ctx.txt");
        fs::write(&listing, format!("{}\n{}\n", locked.display(), file.display())).unwrap();

        let context = load_context_file(&listing);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Root can still list the directory; either way the load succeeds.
        let context = context.unwrap();
        assert!(context.contains(&format!("\n{}", locked.display())));
        assert!(context.contains("keep going"));
    }

    #[test]
    fn test_missing_listing_is_error() {
        let dir = tempdir().unwrap();
        assert!(load_context_file(&dir.path().join("absent.txt")).is_err());
    }
}
