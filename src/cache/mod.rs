// src/cache/mod.rs

//! Task result caching.
//!
//! - [`store`] keeps one slot per task hash, locally and optionally remotely.
//! - [`inflight`] makes concurrent requests for one hash share one execution.
//! - [`lock`] extends that across processes sharing a cache directory.
//! - [`outputs`] tracks which hash produced the outputs currently on disk.

pub mod inflight;
pub mod lock;
pub mod outputs;
pub mod remote;
pub mod store;

pub use inflight::{InFlight, Origin};
pub use lock::HashLock;
pub use outputs::{
    BookkeepingFuture, InMemoryOutputs, NoOutputsTracking, OutputsBookkeeping, OutputsHashes,
};
pub use remote::{DirectoryRemoteCache, RemoteCache};
pub use store::{CacheLookup, CacheRecord, CacheStore, expand_outputs};
