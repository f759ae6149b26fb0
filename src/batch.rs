use anyhow::{Context, Result};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::classifier::Classifier;
use crate::config::RunConfig;
use crate::events::{Event, Reporter};
use crate::mover::{self, MoveOutcome};
use crate::received;
use crate::verdict::parse_verdict;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub path: PathBuf,
}

/// How a task ended when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Moved to this path.
    Moved(PathBuf),
    /// The action has no directory and there is no others directory.
    NotMoved,
    /// Would have been moved into this directory.
    DryRun(PathBuf),
    Vanished,
    NoVerdict,
}

#[derive(Debug)]
pub struct TaskReport {
    pub path: PathBuf,
    pub result: Result<TaskOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub moved: usize,
    pub not_moved: usize,
    pub dry_run: usize,
    pub vanished: usize,
    pub no_verdict: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Moved(_) => self.moved += 1,
            TaskOutcome::NotMoved => self.not_moved += 1,
            TaskOutcome::DryRun(_) => self.dry_run += 1,
            TaskOutcome::Vanished => self.vanished += 1,
            TaskOutcome::NoVerdict => self.no_verdict += 1,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} emails: {} moved, {} not moved, {} dry-run, {} vanished, {} without action",
            self.total, self.moved, self.not_moved, self.dry_run, self.vanished, self.no_verdict
        )
    }
}

/// Runs the per-file pipeline over a worker pool.
///
/// Each task goes read, sender extraction, classify, parse action, route
/// and move. Workers pull from one bounded queue and push their results
/// onto a completion channel, so results arrive in completion order. With a
/// single worker that is input order.
///
/// A file that vanished or produced no action ends its task quietly.
/// Anything else is fatal: the worker stops, the others finish what they
/// hold and take no new work, and the first error is returned.
pub struct BatchExecutor<C: Classifier> {
    config: Arc<RunConfig>,
    classifier: Arc<C>,
    reporter: Arc<dyn Reporter>,
}

impl<C: Classifier> Clone for BatchExecutor<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            classifier: self.classifier.clone(),
            reporter: self.reporter.clone(),
        }
    }
}

impl<C: Classifier> BatchExecutor<C> {
    pub fn new(config: RunConfig, classifier: Arc<C>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            config: Arc::new(config),
            classifier,
            reporter,
        }
    }

    pub async fn run(&self, paths: Vec<PathBuf>) -> Result<BatchSummary> {
        let total = paths.len();
        let workers = self.config.workers.clamp(1, total.max(1));

        self.reporter.report(Event::RoutingTable {
            entries: self.config.routing.entries(),
            fallback: self.config.routing.others_dir().map(Path::to_path_buf),
        });

        let (task_tx, task_rx) = mpsc::channel::<FileTask>(workers * 2);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<TaskReport>();
        let abort = Arc::new(AtomicBool::new(false));

        let feeder = {
            let abort = abort.clone();
            tokio::spawn(async move {
                for path in paths {
                    if abort.load(Ordering::SeqCst) {
                        break;
                    }
                    if task_tx.send(FileTask { path }).await.is_err() {
                        break;
                    }
                }
            })
        };

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let executor = self.clone();
            let task_rx = task_rx.clone();
            let done_tx = done_tx.clone();
            let abort = abort.clone();
            handles.push(tokio::spawn(async move {
                executor.work(task_rx, done_tx, abort).await
            }));
        }
        drop(done_tx);
        drop(task_rx);

        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };
        let mut first_error: Option<anyhow::Error> = None;
        let mut done = 0;

        while let Some(report) = done_rx.recv().await {
            done += 1;
            match report.result {
                Ok(outcome) => summary.record(&outcome),
                Err(e) if first_error.is_none() => {
                    first_error = Some(e);
                }
                Err(e) => self.reporter.report(Event::TaskFailed {
                    path: report.path,
                    error: format!("{e:#}"),
                }),
            }
            self.reporter.report(Event::Progress { done, total });
        }

        for handle in handles {
            handle.await.context("Worker panicked")?;
        }
        feeder.await.context("Task feeder panicked")?;

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    async fn work(
        self,
        tasks: Arc<Mutex<mpsc::Receiver<FileTask>>>,
        done: mpsc::UnboundedSender<TaskReport>,
        abort: Arc<AtomicBool>,
    ) {
        loop {
            if abort.load(Ordering::SeqCst) {
                break;
            }
            let task = tasks.lock().await.recv().await;
            let Some(task) = task else {
                break;
            };

            let result = self.process_file(&task.path).await;
            let fatal = result.is_err();
            if fatal {
                abort.store(true, Ordering::SeqCst);
            }
            if done
                .send(TaskReport {
                    path: task.path,
                    result,
                })
                .is_err()
                || fatal
            {
                break;
            }
        }
    }

    /// Runs the whole pipeline for one file.
    pub async fn process_file(&self, path: &Path) -> Result<TaskOutcome> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.reporter.report(Event::FileVanished {
                    path: path.to_path_buf(),
                });
                return Ok(TaskOutcome::Vanished);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let sender = received::extract_sender_info(&contents, self.reporter.as_ref());
        let output = self
            .classifier
            .classify(&contents, sender.as_ref())
            .await
            .with_context(|| format!("Failed to classify {}", path.display()))?;

        let Some(verdict) = parse_verdict(&output) else {
            self.reporter.report(Event::NoVerdict {
                path: path.to_path_buf(),
            });
            return Ok(TaskOutcome::NoVerdict);
        };

        let target = self.config.routing.resolve(&verdict);
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.reporter.report(Event::Disposition {
            filename,
            verdict: verdict.to_string(),
            target: target.map(Path::to_path_buf),
            dry_run: self.config.dry_run,
        });

        let Some(target) = target else {
            return Ok(TaskOutcome::NotMoved);
        };
        if self.config.dry_run {
            return Ok(TaskOutcome::DryRun(target.to_path_buf()));
        }

        match mover::move_into_dir(path, target).await? {
            MoveOutcome::Moved(destination) => Ok(TaskOutcome::Moved(destination)),
            MoveOutcome::Vanished => {
                self.reporter.report(Event::FileVanished {
                    path: path.to_path_buf(),
                });
                Ok(TaskOutcome::Vanished)
            }
        }
    }
}
