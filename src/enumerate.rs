use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::events::{Event, Reporter};

/// Expands files and directories into the list of messages to process.
///
/// Directories are listed one level deep and never walked: a destination
/// directory may sit inside, or be, a scanned directory, and files moved
/// there during the run must not be picked up again. The result is taken
/// once up front.
pub fn collect_paths(inputs: &[PathBuf], reporter: &dyn Reporter) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            paths.extend(list_dir(input, reporter)?);
        } else {
            paths.push(input.clone());
        }
    }
    Ok(paths)
}

fn list_dir(dir: &Path, reporter: &dyn Reporter) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            reporter.report(Event::SkippedSubdirectory { path });
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryReporter;
    use tempfile::TempDir;

    #[test]
    fn test_files_pass_through_and_dirs_expand() {
        let dir = TempDir::new().unwrap();
        let maildir = dir.path().join("cur");
        std::fs::create_dir(&maildir).unwrap();
        std::fs::write(maildir.join("b"), b"").unwrap();
        std::fs::write(maildir.join("a"), b"").unwrap();
        let single = dir.path().join("single.eml");
        std::fs::write(&single, b"").unwrap();

        let reporter = MemoryReporter::new();
        let paths = collect_paths(&[single.clone(), maildir.clone()], &reporter).unwrap();

        assert_eq!(paths, vec![single, maildir.join("a"), maildir.join("b")]);
    }

    #[test]
    fn test_not_recursive() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join(".Junk");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("deep"), b"").unwrap();
        std::fs::write(dir.path().join("top"), b"").unwrap();

        let reporter = MemoryReporter::new();
        let paths = collect_paths(&[dir.path().to_path_buf()], &reporter).unwrap();

        assert_eq!(paths, vec![dir.path().join("top")]);
        assert_eq!(
            reporter.events(),
            vec![Event::SkippedSubdirectory { path: nested }]
        );
    }

    #[test]
    fn test_missing_file_kept_for_later() {
        let reporter = MemoryReporter::new();
        let missing = PathBuf::from("/nonexistent/rspamd-move/msg");
        let paths = collect_paths(std::slice::from_ref(&missing), &reporter).unwrap();
        assert_eq!(paths, vec![missing]);
    }

    #[test]
    fn test_snapshot_ignores_later_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("early"), b"").unwrap();

        let reporter = MemoryReporter::new();
        let paths = collect_paths(&[dir.path().to_path_buf()], &reporter).unwrap();
        std::fs::write(dir.path().join("late"), b"").unwrap();

        assert_eq!(paths, vec![dir.path().join("early")]);
    }
}
