//! Sandboxed Rhai engine for hakoniwa.
//!
//! Every script file that a namespace materializes is evaluated by an engine
//! built here. The crate has no internal hakoniwa dependencies:
//!
//! - [`ScriptLimits`] - resource limits applied to every engine
//! - [`create_engine`] - fresh, isolated engine with output routed to `tracing`
//! - [`to_value`] / [`to_dynamic`] - conversion between Rhai values and the
//!   `serde_json::Value` tree the rest of hakoniwa speaks

mod convert;
mod engine;
mod limits;

pub use convert::{ConvertError, to_dynamic, to_value, values_from_array};
pub use engine::{SCRIPT_TARGET, create_engine};
pub use limits::ScriptLimits;

// Re-exported so downstream crates name one version of rhai.
pub use rhai;
