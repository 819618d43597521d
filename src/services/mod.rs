//! Scan pipeline services.

pub mod conflict_matrix;
pub mod detector;
pub mod diff;
pub mod github;
pub mod orchestrator;
pub mod recovery;
pub mod reporter;
pub mod scan_queue;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use conflict_matrix::{load_matrix, ConflictMatrix, SharedMatrix};
pub use detector::{LicenseDetector, ProcessDetector};
pub use github::{GitHubClient, VcsClient};
pub use orchestrator::ScanOrchestrator;
pub use recovery::{recover_queue, RecoveryReport};
pub use reporter::Reporter;
pub use scan_queue::{EnqueueOutcome, Enqueued, ScanQueue};
pub use scheduler::{Scheduler, SchedulerHandle};
