use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::verdict::Verdict;

/// Maps rspamd actions to destination directories.
///
/// Keys are compared exactly: `"Reject"` and `"reject"` are different
/// actions and `"no"` never matches `"no action"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    action_dirs: HashMap<String, PathBuf>,
    others_dir: Option<PathBuf>,
}

impl RoutingTable {
    pub fn new(action_dirs: HashMap<String, PathBuf>, others_dir: Option<PathBuf>) -> Self {
        Self {
            action_dirs,
            others_dir,
        }
    }

    /// Directory for `verdict`, falling back to the others directory.
    /// `None` means the message stays where it is.
    pub fn resolve(&self, verdict: &Verdict) -> Option<&Path> {
        self.action_dirs
            .get(verdict.as_str())
            .or(self.others_dir.as_ref())
            .map(PathBuf::as_path)
    }

    pub fn others_dir(&self) -> Option<&Path> {
        self.others_dir.as_deref()
    }

    /// Entries sorted by action, for stable logging.
    pub fn entries(&self) -> Vec<(String, PathBuf)> {
        let mut entries: Vec<_> = self
            .action_dirs
            .iter()
            .map(|(action, dir)| (action.clone(), dir.clone()))
            .collect();
        entries.sort();
        entries
    }

    /// Every directory a message could be moved into.
    pub fn directories(&self) -> impl Iterator<Item = &Path> {
        self.action_dirs
            .values()
            .chain(self.others_dir.iter())
            .map(PathBuf::as_path)
    }
}
