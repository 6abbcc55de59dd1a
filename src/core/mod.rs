//! Core modules: the workflow gate, the sandboxed knowledge store, and the
//! dispatcher and transport that expose them to agents.

pub mod assets;
pub mod audit;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod output;
pub mod path_guard;
pub mod rpc;
pub mod scaffold;
pub mod store;
pub mod time;
pub mod transport;
pub mod workflow;
