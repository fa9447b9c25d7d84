//! # swstore
//!
//! Cache storage for the offline cache worker.
//!
//! ## Architecture
//! - **Url/Origin**: nom-based parsing, fragments dropped, default ports folded in
//! - **Request/Response**: request descriptors and responses with one-shot bodies
//! - **Partition**: named map from request descriptor to immutable stored response
//! - **CacheStorage**: creation-ordered set of partitions, safe for concurrent access
//!
//! Entries are only written for GET requests. Partitions are never mutated
//! in place beyond per-key overwrite; invalidation deletes a whole partition.

mod error;
mod http;
mod partition;
mod storage;
mod url;

pub use error::{Error, Result};
pub use http::{Body, Headers, Method, Request, Response};
pub use partition::{cache_key, EntryInfo, Partition, StoredResponse};
pub use storage::CacheStorage;
pub use url::{default_port, Origin, Url};
