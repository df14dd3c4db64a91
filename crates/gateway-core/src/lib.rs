//! Shared primitives for the trust gateway workspace: ids, timestamps, the
//! process clock, the policy/dispatch context types, and the `GatewayError`
//! taxonomy that every other `gateway-*` crate re-tags its errors into.

#![deny(unsafe_code)]

pub mod clock;
pub mod context;
pub mod error;
pub mod ids;

pub use clock::{process_clock, set_process_clock, Clock, FrozenClock, SystemClock};
pub use context::{Context, ToolCallEnvelope};
pub use error::{GatewayError, Transience};
