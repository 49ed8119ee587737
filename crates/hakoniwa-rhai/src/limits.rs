//! Script resource limits.

use rhai::Engine;
use serde::{Deserialize, Serialize};

/// Resource limits applied to every script engine.
///
/// Defaults match the limits the interactive kernel engine has always used.
/// Loaded from the `[limits]` table of a library manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    /// Maximum expression nesting depth at global level.
    pub max_expr_depth: usize,
    /// Maximum expression nesting depth inside functions.
    pub max_fn_expr_depth: usize,
    /// Maximum number of operations per evaluation or call.
    pub max_operations: u64,
    /// Maximum number of modules a script may import.
    pub max_modules: usize,
    /// Maximum function call nesting.
    pub max_call_levels: usize,
    /// Maximum string length in bytes.
    pub max_string_size: usize,
    /// Maximum array length.
    pub max_array_size: usize,
    /// Maximum object map size.
    pub max_map_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_expr_depth: 64,
            max_fn_expr_depth: 64,
            max_operations: 100_000,
            max_modules: 10,
            max_call_levels: 64,
            max_string_size: 1_000_000,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

impl ScriptLimits {
    /// Apply these limits to an engine.
    pub fn apply(&self, engine: &mut Engine) {
        engine.set_max_expr_depths(self.max_expr_depth, self.max_fn_expr_depth);
        engine.set_max_operations(self.max_operations);
        engine.set_max_modules(self.max_modules);
        engine.set_max_call_levels(self.max_call_levels);
        engine.set_max_string_size(self.max_string_size);
        engine.set_max_array_size(self.max_array_size);
        engine.set_max_map_size(self.max_map_size);
    }
}
