pub mod batch;
pub mod classifier;
pub mod config;
pub mod enumerate;
pub mod events;
pub mod mover;
pub mod received;
pub mod router;
pub mod verdict;

pub use batch::{BatchExecutor, BatchSummary, TaskOutcome};
pub use classifier::{Classifier, Rspamc};
pub use config::{Config, RunConfig};
pub use events::{Event, LogReporter, MemoryReporter, Reporter};
pub use received::SenderInfo;
pub use router::RoutingTable;
pub use verdict::Verdict;
