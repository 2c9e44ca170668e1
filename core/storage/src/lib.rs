//! Storage backends for stowage.
//!
//! This crate provides a trait-based interface over heterogeneous storage
//! backends (S3, MinIO, Azure Blob, Google Cloud Storage and SFTP), the
//! provider registry client that supplies per-call settings, and the
//! external worker bridge the SFTP adapter runs on.
//!
//! # Design Principles
//! - Adapter isolation: no backend-specific logic above the adapter trait
//! - Settings per call: adapters never hold configuration or credentials
//! - Async operations: all I/O is async, subprocesses run under deadlines
//! - Unified error semantics: backend errors map onto one error type

pub mod adapter;
pub mod bridge;
pub mod cache;
pub mod memory;
pub mod object_store;
pub mod providers;
pub mod registry;
pub mod scratch;
pub mod sftp;

pub use adapter::{ConnectionHealth, Listing, StorageAdapter};
pub use bridge::{BridgeTimeouts, WorkerBridge, WorkerCommand};
pub use cache::{CacheKey, ListingCache, NoopListingCache, TtlListingCache, DEFAULT_LISTING_TTL};
pub use memory::MemoryAdapter;
pub use object_store::{ObjectStoreAdapter, ObjectStoreFlavor};
pub use providers::{
    Credentials, MemoryProviderRegistry, ProviderConfig, ProviderDescriptor, ProviderRecord,
    ProviderRegistry,
};
pub use registry::{create_default_registry, AdapterRegistry};
pub use scratch::ScratchFile;
pub use sftp::SftpAdapter;
