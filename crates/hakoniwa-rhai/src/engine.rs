//! Engine factory.
//!
//! Each call to [`create_engine`] returns a brand-new engine with its own
//! function table. Nothing registered on one engine is visible to another,
//! which is what keeps two script files from seeing each other's bindings.

use rhai::Engine;
use rhai::module_resolvers::DummyModuleResolver;
use tracing::{debug, info, warn};

use crate::limits::ScriptLimits;

/// Tracing target for output produced by scripts.
pub const SCRIPT_TARGET: &str = "hakoniwa::script";

/// Create a configured, isolated engine.
///
/// `module` is the dotted name of the file being evaluated; it tags every
/// line of script output so `print` calls can be traced back to their file.
pub fn create_engine(limits: &ScriptLimits, module: &str) -> Engine {
    let mut engine = Engine::new();

    limits.apply(&mut engine);

    // Scripts reach other files through the namespace, never by path.
    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");

    register_output(&mut engine, module);

    engine
}

/// Route `print`, `debug` and `log` into tracing.
fn register_output(engine: &mut Engine, module: &str) {
    let print_module = module.to_string();
    engine.on_print(move |text| {
        info!(target: SCRIPT_TARGET, module = %print_module, "{}", text);
    });

    let debug_module = module.to_string();
    engine.on_debug(move |text, source, pos| {
        debug!(
            target: SCRIPT_TARGET,
            module = %debug_module,
            source = source.unwrap_or_default(),
            line = pos.line().unwrap_or_default(),
            "{}",
            text
        );
    });

    // log(level, msg)
    let log_module = module.to_string();
    engine.register_fn("log", move |level: &str, msg: &str| match level {
        "debug" => debug!(target: SCRIPT_TARGET, module = %log_module, "{}", msg),
        "warn" => warn!(target: SCRIPT_TARGET, module = %log_module, "{}", msg),
        "error" => tracing::error!(target: SCRIPT_TARGET, module = %log_module, "{}", msg),
        _ => info!(target: SCRIPT_TARGET, module = %log_module, "{}", msg),
    });
}
