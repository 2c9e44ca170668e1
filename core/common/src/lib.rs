//! Common utilities and types shared across the stowage crates.
//!
//! This module provides the addressing scheme, the error taxonomy and the
//! value types that every storage backend and the façade agree on.

pub mod error;
pub mod types;
pub mod uri;

pub use error::{Error, Result};
pub use types::{FileEntry, ProviderKind, Secret};
pub use uri::{is_cloud_path, CloudUri, CLOUD_SCHEME};
