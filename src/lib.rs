//! spanscope: an explorer for distributed traces.
//!
//! The library holds everything below the window: span validation, the
//! per-service timeline layout, flame graph aggregation, the trace service
//! client and the explorer's view state. `src/main.rs` wires it into an
//! eframe application.

pub mod api;
pub mod client;
pub mod config;
pub mod dataflow;
pub mod error;
pub mod flame;
pub mod prelude;
pub mod span;
pub mod state;
pub mod telemetry;
pub mod themes;
pub mod timeline;
pub mod widgets;

pub use error::{Error, Result};
