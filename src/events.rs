use log::Level;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::received::SenderInfo;

/// Something worth telling the operator about while a batch runs.
///
/// Pipeline components emit these to a [`Reporter`] instead of calling the
/// global logger, so a caller decides where they end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Scanning {
        inputs: Vec<PathBuf>,
    },
    RoutingTable {
        entries: Vec<(String, PathBuf)>,
        fallback: Option<PathBuf>,
    },
    SkippedSubdirectory {
        path: PathBuf,
    },
    FileVanished {
        path: PathBuf,
    },
    UnparseableHeaders {
        reason: String,
    },
    NoRelayMatch {
        received: String,
    },
    SenderFound {
        info: SenderInfo,
    },
    NoVerdict {
        path: PathBuf,
    },
    Disposition {
        filename: String,
        verdict: String,
        target: Option<PathBuf>,
        dry_run: bool,
    },
    Progress {
        done: usize,
        total: usize,
    },
    TaskFailed {
        path: PathBuf,
        error: String,
    },
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Event::TaskFailed { .. } => Level::Error,
            Event::RoutingTable { .. }
            | Event::SkippedSubdirectory { .. }
            | Event::SenderFound { .. } => Level::Debug,
            Event::UnparseableHeaders { .. }
            | Event::NoRelayMatch { .. }
            | Event::NoVerdict { .. } => Level::Warn,
            Event::Scanning { .. }
            | Event::FileVanished { .. }
            | Event::Disposition { .. }
            | Event::Progress { .. } => Level::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Scanning { inputs } => {
                let inputs: Vec<_> = inputs.iter().map(|p| p.display().to_string()).collect();
                write!(f, "Scanning {}", inputs.join(", "))
            }
            Event::RoutingTable { entries, fallback } => {
                write!(f, "Routing table:")?;
                for (verdict, dir) in entries {
                    write!(f, " '{}' -> {};", verdict, dir.display())?;
                }
                match fallback {
                    Some(dir) => write!(f, " others -> {}", dir.display()),
                    None => write!(f, " others not moved"),
                }
            }
            Event::SkippedSubdirectory { path } => {
                write!(f, "Not descending into subdirectory: {}", path.display())
            }
            Event::FileVanished { path } => {
                write!(f, "File vanished, ignoring: {}", path.display())
            }
            Event::UnparseableHeaders { reason } => {
                write!(f, "Could not extract IP/hostname: unparseable headers ({reason})")
            }
            Event::NoRelayMatch { received } => write!(
                f,
                "Could not extract IP/hostname from 'Received' header: {received}"
            ),
            Event::SenderFound { info } => {
                write!(f, "Sender server: {} [{}]", info.hostname, info.ip)
            }
            Event::NoVerdict { path } => write!(
                f,
                "rspamc did not produce an action for email {}",
                path.display()
            ),
            Event::Disposition {
                filename,
                verdict,
                target,
                dry_run,
            } => {
                let target = target
                    .as_ref()
                    .map(|dir| dir.display().to_string())
                    .unwrap_or_else(|| "not moved".to_string());
                write!(f, "{filename} -> {verdict} -> {target}")?;
                if *dry_run {
                    write!(f, " (skipped due to --dry-run)")?;
                }
                Ok(())
            }
            Event::Progress { done, total } => write!(f, "Done {done} of {total}"),
            Event::TaskFailed { path, error } => {
                write!(f, "Failed to process {}: {error}", path.display())
            }
        }
    }
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: Event);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, event: Event) {
        log::log!(event.level(), "{event}");
    }
}

/// Keeps every event in memory, in the order they were reported.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<Event>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn warnings(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.level() == Level::Warn)
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
