//! The download engine: URL admission, coalesced streaming fetch,
//! incremental hashing, atomic publish.

mod engine;
mod pending;

pub use engine::{DownloadEngine, DownloadStream};
pub use pending::PendingDownloads;
