//! Script engine: one Rhai runtime plus its execution context

use crate::app_info::AppInfo;
use crate::callback::{self, CallbackArguments, EngineTag, NativeCallback, HOST_CALLBACK_FN};
use crate::config::EngineOptions;
use crate::error::{Result, ScriptError};
use crate::events::{EventCallback, EventRegistry};
use crate::globals::{self, APP_INFO_GLOBAL};
use crate::ports::{
    DefaultFileSystem, DefaultLogSystem, DefaultWebRequest, FileSystem, LogSystem, WebRequest,
};
use crate::value::{IntoScript, Owner, Value};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rhai::{Array, Dynamic, FnPtr, Map, Scope, AST};
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Handle to a script engine
///
/// Cloning is cheap and yields another handle to the same engine. The engine
/// is torn down when the last handle is dropped; values it produced stay
/// readable but can no longer reach it.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

/// Non-owning engine handle
///
/// Event handlers and callbacks are stored inside the engine, so they should
/// capture one of these rather than an [`Engine`].
#[derive(Clone)]
pub struct WeakEngine {
    inner: Weak<EngineInner>,
}

pub(crate) struct EngineInner {
    generation: u64,
    runtime: rhai::Engine,
    running: ReentrantMutex<()>,
    context: Mutex<ExecutionContext>,
    events: EventRegistry,
    file_system: RwLock<Option<Arc<dyn FileSystem>>>,
    web_request: RwLock<Option<Arc<dyn WebRequest>>>,
    log_system: RwLock<Option<Arc<dyn LogSystem>>>,
    app_info: AppInfo,
    app_info_value: Dynamic,
    options: EngineOptions,
}

/// Top-level variables and accumulated function definitions
///
/// While an evaluation runs, `scope` only collects host bindings and
/// `snapshot` holds the globals as they were when the evaluation started.
struct ExecutionContext {
    scope: Scope<'static>,
    snapshot: Option<Scope<'static>>,
    lib: AST,
    depth: usize,
}

impl Engine {
    /// Create an engine with default options
    pub fn new(app_info: AppInfo) -> Result<Self> {
        Self::with_options(app_info, EngineOptions::default())
    }

    /// Create an engine with explicit runtime limits
    pub fn with_options(app_info: AppInfo, options: EngineOptions) -> Result<Self> {
        options
            .validate()
            .map_err(|e| ScriptError::initialization(e.to_string()))?;
        let app_info_value = rhai::serde::to_dynamic(&app_info)
            .map_err(|e| ScriptError::initialization(format!("Failed to expose app info: {e}")))?;
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);

        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner>| {
            let mut runtime = rhai::Engine::new();
            options.apply(&mut runtime);
            runtime.set_default_tag(Dynamic::from(EngineTag(weak.clone())));
            callback::register(&mut runtime);
            globals::register(&mut runtime, weak.clone());

            let mut scope = Scope::new();
            scope.push_constant(APP_INFO_GLOBAL, app_info_value.clone());

            EngineInner {
                generation,
                runtime,
                running: ReentrantMutex::new(()),
                context: Mutex::new(ExecutionContext {
                    scope,
                    snapshot: None,
                    lib: AST::empty(),
                    depth: 0,
                }),
                events: EventRegistry::default(),
                file_system: RwLock::new(None),
                web_request: RwLock::new(None),
                log_system: RwLock::new(None),
                app_info,
                app_info_value,
                options,
            }
        });

        debug!(
            engine = generation,
            app = %inner.app_info.name,
            max_operations = inner.options.max_operations,
            "Script engine created"
        );
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    /// Unique id of this engine within the process
    pub fn id(&self) -> u64 {
        self.inner.generation
    }

    /// Whether two handles refer to the same engine
    pub fn ptr_eq(a: &Engine, b: &Engine) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Create a non-owning handle
    pub fn downgrade(&self) -> WeakEngine {
        WeakEngine {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Application descriptor the engine was created with
    pub fn app_info(&self) -> &AppInfo {
        &self.inner.app_info
    }

    /// Runtime limits the engine was created with
    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// Compile and run `source` in the engine's execution context
    ///
    /// `filename` annotates errors and is the source that `log` reports.
    /// Top-level variables and function definitions persist into later
    /// evaluations. Script errors are
    /// returned as [`ScriptError::Compilation`] or [`ScriptError::Runtime`]
    /// and leave the engine usable.
    ///
    /// Evaluations from different threads run one at a time. An evaluation
    /// started while another one is running on the same thread (from a
    /// callback or event handler) sees the function definitions but not the
    /// variables of the outer run, and its own top-level variables are
    /// discarded.
    pub fn evaluate(&self, source: &str, filename: Option<&str>) -> Result<Value> {
        let _running = self.inner.running.lock();
        let mut active = self.enter();
        trace!(
            engine = self.id(),
            file = filename.unwrap_or("<anonymous>"),
            nested = !active.persist,
            "Evaluating script"
        );

        let ast = self
            .inner
            .runtime
            .compile_with_scope(&active.scope, source)
            .map_err(|e| ScriptError::from_parse_error(&e, filename))?;

        let mut program = {
            let mut context = self.inner.context.lock();
            context.lib.combine(ast.clone_functions_only());
            context.lib.merge(&ast)
        };
        if let Some(name) = filename {
            program.set_source(name);
        }

        let result = self
            .inner
            .runtime
            .eval_ast_with_scope::<Dynamic>(&mut active.scope, &program)
            .map_err(|e| ScriptError::from_eval_error(*e, filename))?;

        Ok(self.value(result.flatten()))
    }

    fn enter(&self) -> ActiveContext<'_> {
        let mut context = self.inner.context.lock();
        context.depth += 1;
        let persist = context.depth == 1;
        let scope = if persist {
            let scope = mem::take(&mut context.scope);
            context.snapshot = Some(scope.clone());
            scope
        } else {
            self.inner.base_scope()
        };
        ActiveContext {
            inner: &self.inner,
            scope,
            persist,
        }
    }

    /// Request an immediate garbage collection pass
    ///
    /// Rhai values are reference counted and freed as soon as they become
    /// unreachable, so there is nothing to collect.
    pub fn gc(&self) {
        debug!(engine = self.id(), "Garbage collection requested, nothing to do");
    }

    /// Wrap a host primitive
    pub fn new_value<T: IntoScript>(&self, value: T) -> Value {
        self.value(value.into_script())
    }

    /// Create an empty object
    pub fn new_object(&self) -> Value {
        self.value(Dynamic::from_map(Map::new()))
    }

    /// Create a list from `values`
    pub fn new_array(&self, values: &[Value]) -> Value {
        let array: Array = values
            .iter()
            .map(|value| {
                value.check_owner(self.id());
                value.as_dynamic().clone()
            })
            .collect();
        self.value(Dynamic::from_array(array))
    }

    /// Wrap a native function so script code can call it
    ///
    /// The function receives the call's arguments and can reach the engine
    /// through [`Engine::from_arguments`]. An `Err` is raised as a runtime
    /// error at the script call site.
    pub fn new_callback<F>(&self, callback: F) -> Result<Value>
    where
        F: Fn(&CallbackArguments) -> Result<Value> + Send + Sync + 'static,
    {
        let mut function =
            FnPtr::new(HOST_CALLBACK_FN).map_err(|e| ScriptError::from_eval_error(*e, None))?;
        function.add_curry(Dynamic::from(NativeCallback(Arc::new(callback))));
        Ok(self.value(Dynamic::from(function)))
    }

    /// The engine whose script invoked the callback receiving `args`
    pub fn from_arguments(args: &CallbackArguments) -> Engine {
        args.engine().clone()
    }

    /// Wrap callback arguments as values, preserving order
    ///
    /// # Panics
    ///
    /// When `args` belong to a different engine.
    pub fn convert_arguments(&self, args: &CallbackArguments) -> Vec<Value> {
        assert!(
            Engine::ptr_eq(self, args.engine()),
            "callback arguments converted by an engine other than their owner"
        );
        args.raw().iter().map(|arg| self.value(arg.clone())).collect()
    }

    /// Bind a top-level variable visible to later evaluations
    ///
    /// While an evaluation is running, the binding takes effect once the
    /// outermost evaluation finishes.
    pub fn set_global_property(&self, name: &str, value: &Value) -> Result<()> {
        value.check_owner(self.id());
        let mut context = self.inner.context.lock();
        if name == APP_INFO_GLOBAL || context.scope.is_constant(name) == Some(true) {
            return Err(ScriptError::runtime(format!(
                "Cannot assign to constant '{name}'"
            )));
        }
        context.scope.set_or_push(name, value.as_dynamic().clone());
        Ok(())
    }

    /// Read a top-level variable
    ///
    /// While an evaluation is running, this sees the globals as they were
    /// when it started plus bindings made with [`set_global_property`]
    /// since; variables the running script creates appear once it finishes.
    ///
    /// [`set_global_property`]: Engine::set_global_property
    pub fn get_global_property(&self, name: &str) -> Option<Value> {
        let context = self.inner.context.lock();
        context
            .scope
            .get_value::<Dynamic>(name)
            .or_else(|| {
                context
                    .snapshot
                    .as_ref()
                    .and_then(|snapshot| snapshot.get_value::<Dynamic>(name))
            })
            .map(|value| self.value(value.flatten()))
    }

    pub(crate) fn call_function(&self, function: &FnPtr, args: Vec<Dynamic>) -> Result<Value> {
        let lib = self.inner.context.lock().lib.clone();
        let result = function
            .call::<Dynamic>(&self.inner.runtime, &lib, args)
            .map_err(|e| ScriptError::from_eval_error(*e, None))?;
        Ok(self.value(result.flatten()))
    }

    /// Register `handler` for `name`, replacing any previous handler
    pub fn set_event_callback<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let name = name.into();
        let handler: EventCallback = Arc::new(handler);
        let replaced = self.inner.events.set(name.clone(), handler);
        debug!(engine = self.id(), event = %name, replaced, "Event handler registered");
    }

    /// Remove the handler for `name`; unknown names are ignored
    pub fn remove_event_callback(&self, name: &str) {
        if self.inner.events.remove(name) {
            debug!(engine = self.id(), event = %name, "Event handler removed");
        }
    }

    /// Run the handler for `name` on the calling thread
    ///
    /// Returns whether a handler was registered.
    pub fn trigger_event(&self, name: &str, params: &[Value]) -> bool {
        for param in params {
            param.check_owner(self.id());
        }
        self.inner.events.trigger(name, params)
    }

    /// Current storage port, installing the default on first use
    pub fn file_system(&self) -> Arc<dyn FileSystem> {
        port_or_default(&self.inner.file_system, || {
            let file_system = match &self.inner.options.storage_base_path {
                Some(path) => DefaultFileSystem::with_base_path(path.clone()),
                None => DefaultFileSystem::new(),
            };
            Arc::new(file_system)
        })
    }

    /// Replace the storage port
    pub fn set_file_system(&self, file_system: Arc<dyn FileSystem>) {
        debug!(engine = self.id(), port = ?file_system, "Storage port replaced");
        *self.inner.file_system.write() = Some(file_system);
    }

    /// Current network port, installing the default on first use
    pub fn web_request(&self) -> Arc<dyn WebRequest> {
        port_or_default(&self.inner.web_request, || {
            Arc::new(DefaultWebRequest::with_timeout(self.inner.options.network_timeout))
        })
    }

    /// Replace the network port
    pub fn set_web_request(&self, web_request: Arc<dyn WebRequest>) {
        debug!(engine = self.id(), port = ?web_request, "Network port replaced");
        *self.inner.web_request.write() = Some(web_request);
    }

    /// Current logging port, installing the default on first use
    pub fn log_system(&self) -> Arc<dyn LogSystem> {
        port_or_default(&self.inner.log_system, || Arc::new(DefaultLogSystem))
    }

    /// Replace the logging port
    pub fn set_log_system(&self, log_system: Arc<dyn LogSystem>) {
        debug!(engine = self.id(), port = ?log_system, "Logging port replaced");
        *self.inner.log_system.write() = Some(log_system);
    }

    pub(crate) fn owner(&self) -> Owner {
        Owner {
            engine: Arc::downgrade(&self.inner),
            generation: self.inner.generation,
        }
    }

    pub(crate) fn value(&self, value: Dynamic) -> Value {
        Value::new(self.owner(), value)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.inner.generation)
            .field("app_info", &self.inner.app_info)
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

impl WeakEngine {
    /// Get the engine back if it is still alive
    pub fn upgrade(&self) -> Option<Engine> {
        self.inner.upgrade().map(Engine::from_inner)
    }
}

impl fmt::Debug for WeakEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEngine")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl EngineInner {
    /// Scope for evaluations nested inside a running one
    fn base_scope(&self) -> Scope<'static> {
        let mut scope = Scope::new();
        scope.push_constant(APP_INFO_GLOBAL, self.app_info_value.clone());
        scope
    }

    pub(crate) fn log_system(self: &Arc<Self>) -> Arc<dyn LogSystem> {
        Engine::from_inner(Arc::clone(self)).log_system()
    }
}

/// Execution context checked out for one evaluation
///
/// Dropping it hands the scope back, including on error paths. Globals the
/// host bound while the scope was checked out are merged in on top.
struct ActiveContext<'a> {
    inner: &'a EngineInner,
    scope: Scope<'static>,
    persist: bool,
}

impl Drop for ActiveContext<'_> {
    fn drop(&mut self) {
        let mut context = self.inner.context.lock();
        context.depth -= 1;
        if !self.persist {
            return;
        }

        context.snapshot = None;
        let pending = mem::replace(&mut context.scope, mem::take(&mut self.scope));
        for (name, _, value) in pending.iter() {
            if context.scope.is_constant(name) == Some(true) {
                warn!(engine = self.inner.generation, global = %name, "Skipping assignment to constant");
                continue;
            }
            context.scope.set_or_push(name, value);
        }
    }
}

fn port_or_default<T, F>(slot: &RwLock<Option<Arc<T>>>, init: F) -> Arc<T>
where
    T: ?Sized,
    F: FnOnce() -> Arc<T>,
{
    if let Some(port) = slot.read().as_ref() {
        return Arc::clone(port);
    }
    let mut slot = slot.write();
    Arc::clone(slot.get_or_insert_with(init))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::StatResult;

    fn engine() -> Engine {
        Engine::new(AppInfo::new("test", "1.0")).unwrap()
    }

    #[test]
    fn test_evaluate_returns_last_expression() {
        let engine = engine();
        assert_eq!(engine.evaluate("1 + 1", None).unwrap().as_int().unwrap(), 2);
        assert!(engine.evaluate("let x = 1;", None).unwrap().is_undefined());
    }

    #[test]
    fn test_variables_and_functions_persist() {
        let engine = engine();
        engine
            .evaluate("let counter = 40; fn bump(x) { x + 1 }", Some("setup.rhai"))
            .unwrap();
        engine.evaluate("counter += 1;", None).unwrap();
        let result = engine.evaluate("bump(counter)", None).unwrap();
        assert_eq!(result.as_int().unwrap(), 42);
    }

    #[test]
    fn test_errors_leave_engine_usable() {
        let engine = engine();
        engine.evaluate("let kept = 7;", None).unwrap();

        let err = engine.evaluate("invalid script", Some("bad.rhai")).unwrap_err();
        assert!(err.is_script_error());
        assert_eq!(err.source_name(), Some("bad.rhai"));

        let err = engine.evaluate("throw \"boom\"", None).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { .. }));

        assert!(engine.evaluate("1 + 1 == 2", None).unwrap().as_bool().unwrap());
        assert_eq!(engine.evaluate("kept", None).unwrap().as_int().unwrap(), 7);
    }

    #[test]
    fn test_app_info_is_constant() {
        let engine = engine();
        let name = engine.evaluate("app_info.name", None).unwrap();
        assert_eq!(name.as_string().unwrap(), "test");

        assert!(engine.evaluate("app_info = 1;", None).is_err());
        assert!(engine
            .set_global_property("app_info", &engine.new_value(1))
            .is_err());
    }

    #[test]
    fn test_global_properties() {
        let engine = engine();
        engine
            .set_global_property("limit", &engine.new_value(10))
            .unwrap();
        assert_eq!(engine.evaluate("limit * 2", None).unwrap().as_int().unwrap(), 20);

        engine.evaluate("let found = \"yes\";", None).unwrap();
        let found = engine.get_global_property("found").unwrap();
        assert_eq!(found.as_string().unwrap(), "yes");
        assert!(engine.get_global_property("absent").is_none());
    }

    #[test]
    fn test_nested_evaluate_from_callback() {
        let engine = engine();
        let callback = engine
            .new_callback(|args| {
                let engine = Engine::from_arguments(args);
                engine.set_global_property("from_callback", &engine.new_value(true))?;
                engine.evaluate("let temp = 5; double(temp)", None)
            })
            .unwrap();
        engine.set_global_property("nested", &callback).unwrap();

        let result = engine
            .evaluate("fn double(x) { x * 2 } let outer = 1; nested.call()", None)
            .unwrap();
        assert_eq!(result.as_int().unwrap(), 10);

        assert!(engine.get_global_property("outer").is_some());
        assert!(engine.get_global_property("temp").is_none());
        assert!(engine
            .get_global_property("from_callback")
            .unwrap()
            .as_bool()
            .unwrap());
    }

    #[test]
    fn test_globals_readable_during_evaluation() {
        let engine = engine();
        engine.evaluate("let threshold = 5;", None).unwrap();

        let callback = engine
            .new_callback(|args| {
                let engine = Engine::from_arguments(args);
                let name = engine.convert_arguments(args)[0].as_string()?;
                Ok(engine
                    .get_global_property(&name)
                    .unwrap_or_else(|| engine.new_value("missing")))
            })
            .unwrap();
        engine.set_global_property("lookup", &callback).unwrap();

        let result = engine.evaluate(r#"lookup.call("threshold")"#, None).unwrap();
        assert_eq!(result.as_int().unwrap(), 5);

        let result = engine.evaluate(r#"lookup.call("nothing")"#, None).unwrap();
        assert_eq!(result.as_string().unwrap(), "missing");

        engine.evaluate("threshold = 9;", None).unwrap();
        let result = engine.evaluate(r#"lookup.call("threshold")"#, None).unwrap();
        assert_eq!(result.as_int().unwrap(), 9);
    }

    #[test]
    fn test_gc_is_harmless() {
        let engine = engine();
        engine.evaluate("let x = [1, 2, 3];", None).unwrap();
        engine.gc();
        assert_eq!(engine.evaluate("x.len()", None).unwrap().as_int().unwrap(), 3);
    }

    #[test]
    fn test_new_array() {
        let engine = engine();
        let list = engine.new_array(&[engine.new_value(1), engine.new_value("a")]);
        engine.set_global_property("list", &list).unwrap();
        assert_eq!(engine.evaluate("list.len()", None).unwrap().as_int().unwrap(), 2);
    }

    #[test]
    fn test_default_ports_are_installed_once() {
        let engine = engine();
        assert!(Arc::ptr_eq(&engine.file_system(), &engine.file_system()));
        assert!(Arc::ptr_eq(&engine.web_request(), &engine.web_request()));
        assert!(Arc::ptr_eq(&engine.log_system(), &engine.log_system()));
    }

    #[test]
    fn test_storage_base_path_option() {
        let dir = tempfile::tempdir().unwrap();
        let options = EngineOptions::default().with_storage_base_path(dir.path());
        let engine = Engine::with_options(AppInfo::default(), options).unwrap();

        engine.file_system().write("state.txt", b"ok").unwrap();
        assert!(dir.path().join("state.txt").exists());
        let stat: StatResult = engine.file_system().stat("state.txt").unwrap();
        assert!(stat.is_file);
    }

    #[test]
    fn test_invalid_options_fail_initialization() {
        let options = EngineOptions {
            max_call_levels: 0,
            ..EngineOptions::default()
        };
        let err = Engine::with_options(AppInfo::default(), options).unwrap_err();
        assert!(matches!(err, ScriptError::Initialization { .. }));
    }

    #[test]
    fn test_operation_limit() {
        let options = EngineOptions::default().with_max_operations(1_000);
        let engine = Engine::with_options(AppInfo::default(), options).unwrap();
        let err = engine.evaluate("loop {}", None).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { .. }));
    }

    #[test]
    fn test_weak_engine() {
        let engine = engine();
        let weak = engine.downgrade();
        assert!(Engine::ptr_eq(&weak.upgrade().unwrap(), &engine));
        drop(engine);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_engine_ids_are_unique() {
        assert_ne!(engine().id(), engine().id());
    }
}
