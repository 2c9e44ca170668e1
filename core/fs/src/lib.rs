//! File operations over local paths and cloud providers.
//!
//! [`Storage`] is the single entry point: callers pass either a local path
//! or a `cloud://<provider>/<path>` URI and never see which backend served
//! the call. [`MigrationEngine`] bulk-uploads a local tree.

pub mod config;
pub mod facade;
pub mod local;
pub mod migration;
pub mod retry;

pub use config::StorageConfig;
pub use facade::Storage;
pub use migration::{MigrationConfig, MigrationEngine, MigrationFailure, MigrationReport};
pub use retry::{RetryConfig, RetryExecutor};
