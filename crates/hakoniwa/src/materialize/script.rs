//! Rhai materializer.
//!
//! Every file is compiled and run by its own engine with its own scope, so
//! nothing a file binds is visible to any other file or to the caller. After
//! the top level has run:
//!
//! - one public function named like the file (`encoder` or `Encoder` in
//!   `encoder.rhai`) makes the file a single construct
//! - otherwise the file becomes a module exposing its top-level variables
//!   and public functions
//!
//! Scripts that need other library entries call the pre-registered
//! back-reference functions:
//!
//! ```rhai
//! let cfg = lib("config");            // data, from the library root
//! let vocab = sibling("vocab");       // data, from this file's directory
//! let y = lib_call("math.scale", [2]) // call a construct or module function
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hakoniwa_rhai::rhai::{
    self, AST, Array, CallFnOptions, Dynamic, Engine, EvalAltResult, FnAccess, Position, Scope,
};
use hakoniwa_rhai::{ScriptLimits, create_engine, to_dynamic, to_value, values_from_array};
use tracing::{debug, trace};

use super::{CodeMaterializer, MaterializeRequest, ScriptContext};
use crate::error::{ExecutionError, ResolveError};
use crate::value::{Callable, CodeModule, CodeObject, Entry, Value};

/// Materializes `.rhai` files.
#[derive(Debug, Clone, Default)]
pub struct RhaiMaterializer {
    limits: ScriptLimits,
}

impl RhaiMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materializer applying `limits` to every engine it creates.
    pub fn with_limits(limits: ScriptLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }
}

impl CodeMaterializer for RhaiMaterializer {
    fn name(&self) -> &str {
        "rhai"
    }

    fn extensions(&self) -> &[&str] {
        &["rhai"]
    }

    #[tracing::instrument(skip(self, request), fields(module = %request.qualified_name))]
    fn materialize(&self, request: &MaterializeRequest) -> Result<CodeObject, ExecutionError> {
        let mut engine = create_engine(&self.limits, &request.qualified_name);
        register_back_references(&mut engine, &request.context);

        let ast = engine
            .compile(&request.source)
            .map_err(|e| ExecutionError::new(&request.path, e.0.to_string()).at(e.1.line(), e.1.position()))?;

        let mut scope = Scope::new();
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| execution_error(&request.path, *e))?;

        let functions = public_functions(&ast);
        let constants: Vec<(String, Dynamic)> = scope
            .iter_raw()
            .filter(|(_, constant, _)| *constant)
            .map(|(name, _, value)| (name.to_string(), value.clone()))
            .collect();
        let ast = callable_ast(&engine, &ast, &constants)
            .map_err(|e| ExecutionError::new(&request.path, e.to_string()))?;
        let unit = Arc::new(ScriptUnit {
            engine,
            ast,
            constants,
            path: request.path.clone(),
        });

        if !request.as_module {
            if let Some((name, arities)) = single_construct(&functions, request) {
                debug!(construct = %name, "file defines a single construct");
                let qualified_name = request.qualify(name, true);
                return Ok(CodeObject::Construct(Arc::new(ScriptFunction {
                    unit,
                    name: name.to_string(),
                    qualified_name,
                    arities: arities.clone(),
                })));
            }
        }

        let mut module = CodeModule::new(&request.stem, &request.qualified_name, &request.path);
        for (name, _constant, value) in scope.iter_raw() {
            match to_value(value) {
                Ok(value) => module.insert_value(name, value),
                Err(e) => trace!(binding = %name, error = %e, "skipping non-data binding"),
            }
        }
        for (name, arities) in functions {
            let qualified_name = request.qualify(&name, false);
            module.insert_function(Arc::new(ScriptFunction {
                unit: unit.clone(),
                name,
                qualified_name,
                arities,
            }));
        }

        debug!(members = module.len(), "materialized module");
        Ok(CodeObject::Module(module))
    }
}

/// Public script functions grouped by name, with their arities.
fn public_functions(ast: &AST) -> BTreeMap<String, Vec<usize>> {
    let mut functions: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for f in ast.iter_functions() {
        if matches!(f.access, FnAccess::Private) || f.name.starts_with("anon$") {
            continue;
        }
        functions
            .entry(f.name.to_string())
            .or_default()
            .push(f.params.len());
    }
    for arities in functions.values_mut() {
        arities.sort_unstable();
    }
    functions
}

/// The one function named after the file, if there is exactly one.
fn single_construct<'a>(
    functions: &'a BTreeMap<String, Vec<usize>>,
    request: &MaterializeRequest,
) -> Option<(&'a str, &'a Vec<usize>)> {
    let mut matching = functions.iter().filter(|(name, _)| {
        name.as_str() == request.stem || name.as_str() == request.construct_name
    });
    let (name, arities) = matching.next()?;
    if matching.next().is_some() || arities.len() != 1 {
        return None;
    }
    Some((name.as_str(), arities))
}

/// The file's functions behind a prelude that re-declares its top-level
/// constants from the call scope, so `global::NAME` resolves inside calls
/// without running the top level again.
fn callable_ast(
    engine: &Engine,
    ast: &AST,
    constants: &[(String, Dynamic)],
) -> Result<AST, rhai::ParseError> {
    let prelude: String = constants
        .iter()
        .map(|(name, _)| format!("const {name} = {name};\n"))
        .collect();
    Ok(engine.compile(prelude)?.merge(&ast.clone_functions_only()))
}

/// Compiled file kept alive for calls into its functions.
struct ScriptUnit {
    engine: Engine,
    ast: AST,
    constants: Vec<(String, Dynamic)>,
    path: PathBuf,
}

impl std::fmt::Debug for ScriptUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptUnit")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A script function exposed as a [`Callable`].
#[derive(Debug)]
struct ScriptFunction {
    unit: Arc<ScriptUnit>,
    name: String,
    qualified_name: String,
    arities: Vec<usize>,
}

impl Callable for ScriptFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    fn arities(&self) -> &[usize] {
        &self.arities
    }

    fn call(&self, args: Vec<Value>) -> Result<Value, ExecutionError> {
        let path = &self.unit.path;
        if !self.arities.contains(&args.len()) {
            return Err(ExecutionError::new(
                path,
                format!(
                    "`{}` takes {:?} argument(s), got {}",
                    self.qualified_name,
                    self.arities,
                    args.len()
                ),
            ));
        }

        let args = args
            .iter()
            .map(to_dynamic)
            .collect::<Result<Vec<Dynamic>, _>>()
            .map_err(|e| ExecutionError::new(path, e.to_string()))?;

        trace!(function = %self.qualified_name, "calling script function");
        let mut scope = Scope::new();
        for (name, value) in &self.unit.constants {
            scope.push_constant_dynamic(name.clone(), value.clone());
        }
        let options = CallFnOptions::new().eval_ast(true).rewind_scope(true);
        let result: Dynamic = self
            .unit
            .engine
            .call_fn_with_options(options, &mut scope, &self.unit.ast, &self.name, args)
            .map_err(|e| execution_error(path, *e))?;

        to_value(&result).map_err(|e| ExecutionError::new(path, e.to_string()))
    }
}

/// Convert an engine error, moving its position into the error's fields.
fn execution_error(path: &Path, mut err: EvalAltResult) -> ExecutionError {
    let position: Position = err.take_position();
    ExecutionError::new(path, err.to_string()).at(position.line(), position.position())
}

// ============================================================================
// Back-references
// ============================================================================

fn register_back_references(engine: &mut Engine, context: &ScriptContext) {
    let ctx = context.clone();
    engine.register_fn("lib", move |path: &str| -> Result<Dynamic, Box<EvalAltResult>> {
        entry_to_dynamic(path, ctx.resolve(path))
    });

    let ctx = context.clone();
    engine.register_fn("sibling", move |path: &str| -> Result<Dynamic, Box<EvalAltResult>> {
        entry_to_dynamic(path, ctx.resolve_sibling(path))
    });

    let ctx = context.clone();
    engine.register_fn(
        "lib_call",
        move |path: &str, args: Array| -> Result<Dynamic, Box<EvalAltResult>> {
            call_entry(&ctx, path, args)
        },
    );

    let ctx = context.clone();
    engine.register_fn("lib_call", move |path: &str| -> Result<Dynamic, Box<EvalAltResult>> {
        call_entry(&ctx, path, Array::new())
    });
}

fn call_entry(ctx: &ScriptContext, path: &str, args: Array) -> Result<Dynamic, Box<EvalAltResult>> {
    let args = values_from_array(args).map_err(|e| e.to_string())?;
    let result = ctx
        .resolve(path)
        .and_then(|entry| entry.call(args))
        .map_err(|e| e.to_string())?;
    Ok(to_dynamic(&result).map_err(|e| e.to_string())?)
}

/// Hand a resolved entry to a script.
///
/// Data crosses as a script value and a module as a map of its data
/// bindings. Namespaces and constructs have no script representation.
fn entry_to_dynamic(
    path: &str,
    entry: Result<Entry, ResolveError>,
) -> Result<Dynamic, Box<EvalAltResult>> {
    let entry = entry.map_err(|e| e.to_string())?;
    let dynamic = match &entry {
        Entry::Data(value) => to_dynamic(value),
        Entry::Code(code) => match code.as_module() {
            Some(module) => {
                let mut map = rhai::Map::new();
                for name in module.names() {
                    if let Some(value) = module.value(name) {
                        map.insert(name.into(), to_dynamic(value).map_err(|e| e.to_string())?);
                    }
                }
                Ok(Dynamic::from_map(map))
            }
            None => return Err(format!("`{path}` is a construct; call it with lib_call").into()),
        },
        Entry::Namespace(_) => {
            return Err(format!("`{path}` is a namespace; ask for one of its members").into());
        }
    };
    Ok(dynamic.map_err(|e| e.to_string())?)
}
