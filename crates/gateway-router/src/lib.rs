//! The universal router (spec.md §4.4): a provider-agnostic fan-out layer
//! over any number of live accounts, with retry, per-account rate
//! limiting, a point-read cache, and virtual-id translation at the
//! boundary.

#![deny(unsafe_code)]

pub mod backend;
pub mod cache;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod rate_limit;
pub mod retry;
pub mod router;
pub mod translate;

pub use backend::{Attachment, LiveAccount, ListParams, NormalizedRecord, ProviderBackend, SearchParams, SendParams};
pub use cache::RecordCache;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{FailingMockBackend, StaticMockBackend};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{with_retry, RetryPolicy};
pub use router::{PluginRegistry, Router};
pub use translate::{to_virtual, VirtualRecord};
