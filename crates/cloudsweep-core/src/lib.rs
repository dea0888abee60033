//! Policy-driven cleanup of cloud account resources.
//!
//! Each service exposes a `run_cleanup` entry point that lists candidates
//! through a remote API trait, evaluates them against a typed policy and
//! deletes (or, by default, only reports) the ones in scope.

pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod policy;
pub mod predicate;
pub mod report;
pub mod resource;
pub mod services;
pub mod time;

#[cfg(feature = "aws")]
pub mod aws;

pub use error::{CleanupError, PolicyError, RemoteError};
pub use orchestrator::{RunContext, RunOptions};
pub use policy::{Hazard, Policies};
pub use report::{DeletionReport, NullObserver, Observer, ProgressEvent, Summary};
pub use services::Service;
pub use time::{Clock, FixedClock, SystemClock};
