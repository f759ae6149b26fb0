use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::router::RoutingTable;

/// From https://rspamd.com/doc/faq.html#what-are-rspamd-actions
pub const COMMON_ACTIONS: &[&str] = &[
    "discard",
    "reject",
    "greylist",
    "rewrite subject",
    "add header",
    "no action",
    "soft reject",
];

pub const DEFAULT_THREADS: usize = 16;

/// On-disk configuration. Everything here can also be given on the
/// command line, which takes precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub action_to_dir: BTreeMap<String, PathBuf>,
    pub others_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub threads: usize,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            program: "rspamc".to_string(),
            args: vec![
                "-h".to_string(),
                "/run/rspamd/worker-controller.sock".to_string(),
            ],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            action_to_dir: BTreeMap::new(),
            others_dir: None,
            dry_run: false,
            threads: DEFAULT_THREADS,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {path}"))?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Example configuration written by `--generate-config`.
    pub fn example() -> Self {
        let mut action_to_dir = BTreeMap::new();
        action_to_dir.insert(
            "reject".to_string(),
            PathBuf::from("/var/vmail/example.com/mail/.Junk/cur"),
        );
        action_to_dir.insert(
            "no action".to_string(),
            PathBuf::from("/var/vmail/example.com/mail/.Unclassified/cur"),
        );
        Config {
            action_to_dir,
            others_dir: Some(PathBuf::from("/var/vmail/example.com/mail/.Review/cur")),
            ..Config::default()
        }
    }
}

/// Settings shared read-only by every worker for the whole run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub routing: RoutingTable,
    pub dry_run: bool,
    pub workers: usize,
}

impl RunConfig {
    pub fn new(routing: RoutingTable, dry_run: bool, workers: usize) -> anyhow::Result<Self> {
        if workers == 0 {
            bail!("Number of threads must be a positive integer");
        }
        Ok(Self {
            routing,
            dry_run,
            workers,
        })
    }

    /// Combines the file configuration with command-line overrides.
    pub fn from_sources(file: &Config, cli: &CliOverrides) -> anyhow::Result<Self> {
        let mut action_dirs: HashMap<String, PathBuf> = file
            .action_to_dir
            .iter()
            .map(|(action, dir)| (action.clone(), dir.clone()))
            .collect();

        let mut from_cli: HashMap<&str, &PathBuf> = HashMap::new();
        for (action, dir) in &cli.action_to_dir {
            if let Some(previous) = from_cli.insert(action.as_str(), dir) {
                if previous != dir {
                    return Err(anyhow!(
                        "Action '{}' given twice with different directories: {} and {}",
                        action,
                        previous.display(),
                        dir.display()
                    ));
                }
            }
            action_dirs.insert(action.clone(), dir.clone());
        }

        for action in action_dirs.keys() {
            if !COMMON_ACTIONS.contains(&action.as_str()) {
                log::warn!(
                    "Action '{}' is not a known rspamd action ({})",
                    action,
                    COMMON_ACTIONS.join(", ")
                );
            }
        }

        let others_dir = cli.others_dir.clone().or_else(|| file.others_dir.clone());
        let dry_run = cli.dry_run || file.dry_run;
        let workers = cli.threads.unwrap_or(file.threads);

        let run = Self::new(RoutingTable::new(action_dirs, others_dir), dry_run, workers)?;
        run.check_directories()?;
        Ok(run)
    }

    /// Every destination must be an existing directory. Under dry-run a
    /// missing one is only warned about.
    pub fn check_directories(&self) -> anyhow::Result<()> {
        for dir in self.routing.directories() {
            if dir.is_dir() {
                continue;
            }
            if self.dry_run {
                log::warn!("Target directory does not exist: {}", dir.display());
            } else {
                bail!("Target directory does not exist: {}", dir.display());
            }
        }
        Ok(())
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub action_to_dir: Vec<(String, PathBuf)>,
    pub others_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub threads: Option<usize>,
}
