//! Session-scoped JSON-RPC transport, tool dispatch envelope, and the HTTP
//! management surface (spec.md §4.5, §6). Grounded on
//! `pagi-xcurzens-gateway::main`'s `AppState` + `Router::new().with_state`
//! wiring for how the pieces below are assembled into one `axum::serve`.

#![deny(unsafe_code)]

pub mod dispatch;
pub mod management;
pub mod protocol;
pub mod session;
pub mod state;
pub mod tools;
pub mod transport;

pub use dispatch::{dispatch_tool_call, DispatchContext};
pub use session::{SessionState, SessionTable};
pub use state::{build_app, AppState};
pub use transport::SESSION_HEADER;
