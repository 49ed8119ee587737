//! End-to-end resolution against a real directory tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hakoniwa::{
    BindRequest, Binder, ConfigurationError, DirEntry, Filesystem, FsResult, LibraryConfig,
    LocalFs, LoaderRegistry, ResolveError, Value, loader_fn,
};
use serde_json::json;
use tempfile::TempDir;

/// Counts every filesystem call that resolution makes.
#[derive(Debug, Default)]
struct CountingFs {
    inner: LocalFs,
    calls: AtomicUsize,
}

impl CountingFs {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Filesystem for CountingFs {
    fn read_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        self.tick();
        self.inner.read_dir(path)
    }

    fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        self.tick();
        self.inner.read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.tick();
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.tick();
        self.inner.is_dir(path)
    }

    fn canonicalize(&self, path: &Path) -> FsResult<PathBuf> {
        self.tick();
        self.inner.canonicalize(path)
    }
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A small library:
///
/// ```text
/// config.yaml
/// Encoder.rhai
/// math.rhai
/// models/
///   __init__.rhai
///   bert/
///     params.json
///   text_encoder.rhai
/// notes.md
/// ```
fn fixture() -> TempDir {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "config.yaml", "name: demo\nlayers: [64, 32]\n");
    write(
        root,
        "Encoder.rhai",
        r##"
        fn pad(s) { s + "#" }
        fn Encoder(s) { pad(s.to_upper()) }
        "##,
    );
    write(
        root,
        "math.rhai",
        r#"
        const SCALE = 3;
        let primes = [2, 3, 5];
        fn scale(x) { x * global::SCALE }
        fn add(a, b) { a + b }
        "#,
    );
    write(root, "models/__init__.rhai", "let default_model = \"bert\";\n");
    write(root, "models/bert/params.json", r#"{"hidden": 768}"#);
    write(
        root,
        "models/text_encoder.rhai",
        r#"
        fn TextEncoder(s) {
            let params = lib("models.bert.params");
            `${s}:${params.hidden}`
        }
        "#,
    );
    write(root, "notes.md", "# Notes\n");
    dir
}

fn bind(binder: &Binder, dir: &TempDir) -> Arc<hakoniwa::Library> {
    binder.bind("demo", dir.path()).unwrap()
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_repeated_access_is_a_cache_hit() {
    let dir = fixture();
    let counting = Arc::new(CountingFs::default());
    let binder = Binder::new();
    let lib = binder
        .bind_with(BindRequest::new("demo", dir.path()).filesystem(counting.clone()))
        .unwrap();

    for name in ["config", "models", "Encoder", "math", "notes"] {
        let first = lib.get(name).unwrap();
        let before = counting.calls();
        let second = lib.get(name).unwrap();
        assert_eq!(counting.calls(), before, "{name} touched the filesystem");
        assert!(first.ptr_eq(&second), "{name} changed identity");
    }
}

#[test]
fn test_first_resolution_reads_listing_and_one_file() {
    let dir = fixture();
    let counting = Arc::new(CountingFs::default());
    let binder = Binder::new();
    let lib = binder
        .bind_with(BindRequest::new("demo", dir.path()).filesystem(counting.clone()))
        .unwrap();

    // The root has no initializer, so it is settled by the first miss.
    lib.get("notes").unwrap();
    let before = counting.calls();
    lib.get("config").unwrap();
    assert_eq!(counting.calls() - before, 2);
}

#[test]
fn test_missing_names_at_every_depth() {
    let dir = fixture();
    let binder = Binder::new();
    let lib = bind(&binder, &dir);

    assert!(lib.get("absent").unwrap_err().is_missing());
    assert!(lib.resolve("models.absent").unwrap_err().is_missing());
    assert!(lib.resolve("models.bert.absent").unwrap_err().is_missing());
    assert!(lib.resolve("math.absent").unwrap_err().is_missing());
    assert!(!lib.contains("absent").unwrap());
    assert!(lib.contains("config").unwrap());
    assert!(lib.try_get("absent").unwrap().is_none());
}

#[test]
fn test_directory_maps_to_namespace() {
    let dir = fixture();
    let binder = Binder::new();
    let lib = bind(&binder, &dir);

    let models = lib.get("models").unwrap();
    let ns = models.as_namespace().unwrap();
    assert_eq!(ns.path(), lib.root().join("models"));
    assert_eq!(ns.qualified_name(), "demo.models");
    assert!(models.ptr_eq(&lib.get("models").unwrap()));

    let bert = ns.get("bert").unwrap();
    assert!(bert.ptr_eq(&lib.resolve("demo.models.bert").unwrap()));
    assert_eq!(
        lib.resolve("models.bert.params").unwrap().as_data(),
        Some(&json!({"hidden": 768}))
    );
}

#[test]
fn test_data_file_is_read_once() {
    let dir = fixture();
    let binder = Binder::new();
    let lib = bind(&binder, &dir);

    let first = lib.get("config").unwrap();
    assert_eq!(
        first.as_data(),
        Some(&json!({"name": "demo", "layers": [64, 32]}))
    );

    write(dir.path(), "config.yaml", "name: changed\n");
    let second = lib.get("config").unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(second.as_data().unwrap()["name"], json!("demo"));

    assert_eq!(lib.get("notes").unwrap().as_data(), Some(&json!("# Notes\n")));
}

#[test]
fn test_single_construct_is_returned_directly() {
    let dir = fixture();
    let binder = Binder::new();
    let lib = bind(&binder, &dir);

    let encoder = lib.get("Encoder").unwrap();
    let callable = encoder.as_code().and_then(|c| c.as_callable()).unwrap();
    assert_eq!(callable.qualified_name(), "demo.Encoder");
    assert_eq!(encoder.call(vec![json!("ab")]).unwrap(), json!("AB#"));
}

#[test]
fn test_multi_binding_file_is_a_module() {
    let dir = fixture();
    let binder = Binder::new();
    let lib = bind(&binder, &dir);

    let math = lib.get("math").unwrap();
    let module = math.as_code().and_then(|c| c.as_module()).unwrap();
    assert_eq!(
        module.names().collect::<Vec<_>>(),
        vec!["SCALE", "add", "primes", "scale"]
    );
    assert_eq!(lib.resolve("math.SCALE").unwrap().as_data(), Some(&json!(3)));
    assert_eq!(lib.call("math.scale", vec![json!(5)]).unwrap(), json!(15));
    assert_eq!(lib.call("math.add", vec![json!(1), json!(2)]).unwrap(), json!(3));
    assert!(matches!(
        lib.call("math.primes", vec![]),
        Err(ResolveError::NotCallable(_))
    ));
}

#[test]
fn test_camel_case_name_and_back_reference() {
    let dir = fixture();
    let binder = Binder::new();
    let lib = bind(&binder, &dir);

    assert_eq!(
        lib.call("models.TextEncoder", vec![json!("tok")]).unwrap(),
        json!("tok:768")
    );
}

#[test]
fn test_package_initializer_answers_first() {
    let dir = fixture();
    let binder = Binder::new();
    let lib = bind(&binder, &dir);

    assert_eq!(
        lib.resolve("models.default_model").unwrap().as_data(),
        Some(&json!("bert"))
    );
    let models = lib.get("models").unwrap();
    assert_eq!(
        models.as_namespace().unwrap().members().unwrap(),
        vec!["bert", "default_model", "text_encoder"]
    );
}

#[test]
fn test_members_of_root() {
    let dir = fixture();
    write(dir.path(), "__pycache__/junk.json", "{}");
    write(dir.path(), ".hidden.yaml", "a: 1");
    write(dir.path(), "weights.bin", "");
    let binder = Binder::new();
    let lib = bind(&binder, &dir);

    assert_eq!(
        lib.members().unwrap(),
        vec!["Encoder", "config", "math", "models", "notes"]
    );
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_parse_error_is_surfaced_and_retried() {
    let dir = fixture();
    write(dir.path(), "broken.json", "{\"a\": ");
    let binder = Binder::new();
    let lib = bind(&binder, &dir);

    let err = lib.get("broken").unwrap_err();
    let ResolveError::Parse(parse) = err else {
        panic!("expected a parse error, got {err:?}");
    };
    assert_eq!(parse.format, "json");
    assert!(parse.path.ends_with("broken.json"));

    write(dir.path(), "broken.json", "{\"a\": 1}");
    assert_eq!(lib.get("broken").unwrap().as_data(), Some(&json!({"a": 1})));
}

#[test]
fn test_execution_error_keeps_message_and_location() {
    let dir = fixture();
    write(dir.path(), "faulty.rhai", "let a = 1;\nlet b = a.no_such_method();\n");
    let binder = Binder::new();
    let lib = bind(&binder, &dir);

    let err = lib.get("faulty").unwrap_err();
    let ResolveError::Execution(exec) = err else {
        panic!("expected an execution error, got {err:?}");
    };
    assert!(exec.path.ends_with("faulty.rhai"));
    assert_eq!(exec.line, Some(2));
    assert!(exec.message.contains("no_such_method"), "{}", exec.message);
}

#[test]
fn test_script_bindings_do_not_leak() {
    let dir = fixture();
    write(dir.path(), "first.rhai", "let secret = 41;");
    write(dir.path(), "second.rhai", "let seen = secret + 1;");
    let binder = Binder::new();
    let lib = bind(&binder, &dir);

    assert!(lib.resolve("first.secret").is_ok());
    assert!(matches!(lib.get("second"), Err(ResolveError::Execution(_))));
    assert!(lib.get("secret").unwrap_err().is_missing());
}

// ============================================================================
// Binding
// ============================================================================

#[test]
fn test_bind_twice_keeps_children_valid() {
    let dir = fixture();
    let binder = Binder::new();
    let first = bind(&binder, &dir);
    let models = first.get("models").unwrap();
    let config = first.get("config").unwrap();

    let second = bind(&binder, &dir);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(models.ptr_eq(&second.get("models").unwrap()));
    assert!(config.ptr_eq(&second.get("config").unwrap()));

    let elsewhere = tempfile::tempdir().unwrap();
    let err = binder.bind("demo", elsewhere.path()).unwrap_err();
    assert!(matches!(err, ConfigurationError::AlreadyBound { .. }));
    assert!(models.ptr_eq(&binder.import("demo").unwrap().get("models").unwrap()));
}

#[test]
fn test_bind_rejects_bad_roots() {
    let dir = fixture();
    let binder = Binder::new();

    let err = binder.bind("missing", dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, ConfigurationError::RootMissing(_)));

    let err = binder.bind("file", dir.path().join("notes.md")).unwrap_err();
    assert!(matches!(err, ConfigurationError::RootNotADirectory(_)));
}

#[test]
fn test_bind_from_manifest() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "core/answer.toml", "value = 42\n");
    write(
        dir.path(),
        "hakoniwa.toml",
        "name = \"answers\"\nsource_dir = \"core\"\n\n[limits]\nmax_operations = 1000\n",
    );

    let config = LibraryConfig::load(dir.path().join("hakoniwa.toml")).unwrap();
    let binder = Binder::new();
    let lib = binder.bind_with(BindRequest::from_config(config)).unwrap();
    assert!(lib.resolve("answer.value").unwrap_err().is_missing());
    assert_eq!(lib.get("answer").unwrap().as_data(), Some(&json!({"value": 42})));
}

#[test]
fn test_custom_loader() {
    let dir = fixture();
    write(dir.path(), "table.csv", "a,b\nc,d\n");
    let mut loaders = LoaderRegistry::with_defaults();
    loaders.register(
        "csv",
        loader_fn("csv", |bytes| {
            let text = std::str::from_utf8(bytes)?;
            Ok(Value::Array(
                text.lines()
                    .map(|line| Value::from(line.split(',').collect::<Vec<_>>()))
                    .collect(),
            ))
        }),
    );

    let binder = Binder::new();
    let lib = binder
        .bind_with(BindRequest::new("demo", dir.path()).loaders(loaders))
        .unwrap();
    assert_eq!(
        lib.get("table").unwrap().as_data(),
        Some(&json!([["a", "b"], ["c", "d"]]))
    );
}

#[test]
fn test_operation_limit_applies() {
    let dir = fixture();
    write(dir.path(), "spin.rhai", "let x = 0;\nloop { x += 1; }\n");
    let binder = Binder::new();
    let limits = hakoniwa::ScriptLimits {
        max_operations: 1_000,
        ..Default::default()
    };
    let lib = binder
        .bind_with(BindRequest::new("demo", dir.path()).limits(limits))
        .unwrap();

    assert!(matches!(lib.get("spin"), Err(ResolveError::Execution(_))));
}
