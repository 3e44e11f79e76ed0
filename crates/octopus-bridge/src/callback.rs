//! Native callbacks invokable from script
//!
//! A callback value is a function pointer to the single registered native
//! function `host_callback`, with the host closure curried in as its first
//! argument. When script calls it, the native function recovers the owning
//! engine from the call context's tag, packs the remaining arguments into
//! [`CallbackArguments`] and runs the closure.

use crate::engine::{Engine, EngineInner};
use crate::error::{runtime_error, Result};
use crate::value::Value;
use rhai::{Dynamic, EvalAltResult, NativeCallContext};
use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Maximum number of arguments a native callback accepts from script
///
/// Rhai resolves `Dynamic` parameters for functions of at most 16
/// parameters, and every bridged function spends one on a leading slot
/// (the curried callback, or the event name for `trigger_event`).
pub const MAX_CALLBACK_ARGS: usize = 15;

/// Name of the native function every callback value points to
pub(crate) const HOST_CALLBACK_FN: &str = "host_callback";

/// Signature of host closures wrapped by [`Engine::new_callback`]
pub type NativeFn = dyn Fn(&CallbackArguments) -> Result<Value> + Send + Sync + 'static;

/// Host closure carried inside a function pointer
#[derive(Clone)]
pub(crate) struct NativeCallback(pub(crate) Arc<NativeFn>);

/// Owning engine, installed as the runtime's default tag
#[derive(Clone)]
pub(crate) struct EngineTag(pub(crate) Weak<EngineInner>);

/// Raw arguments of one callback invocation
///
/// Only the bridge constructs these, while script code is calling into a
/// native callback. Use [`Engine::from_arguments`] to get the engine and
/// [`Engine::convert_arguments`] to get the arguments as values.
pub struct CallbackArguments {
    engine: Engine,
    args: Vec<Dynamic>,
}

impl CallbackArguments {
    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn raw(&self) -> &[Dynamic] {
        &self.args
    }

    /// Number of positional arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether the callback was invoked without arguments
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl fmt::Debug for CallbackArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackArguments")
            .field("engine", &self.engine.id())
            .field("args", &self.args)
            .finish()
    }
}

/// Recover the engine that owns the runtime making this native call
pub(crate) fn engine_from_context(
    ctx: &NativeCallContext<'_>,
) -> Result<Engine, Box<EvalAltResult>> {
    ctx.tag()
        .and_then(|tag| tag.clone().try_cast::<EngineTag>())
        .and_then(|tag| tag.0.upgrade())
        .map(Engine::from_inner)
        .ok_or_else(|| runtime_error("native function invoked outside of its owning engine"))
}

/// Register the dispatcher behind all callback values
///
/// Rhai matches native functions by arity, so one overload is registered per
/// argument count; `Dynamic` parameters accept any type.
#[allow(deprecated)]
pub(crate) fn register(runtime: &mut rhai::Engine) {
    for arity in 0..=MAX_CALLBACK_ARGS {
        let arg_types = vec![TypeId::of::<Dynamic>(); arity + 1];
        runtime.register_raw_fn(HOST_CALLBACK_FN, arg_types, invoke);
    }
}

fn invoke(
    ctx: NativeCallContext<'_>,
    args: &mut [&mut Dynamic],
) -> Result<Dynamic, Box<EvalAltResult>> {
    let engine = engine_from_context(&ctx)?;

    let callback = args
        .first()
        .and_then(|first| (**first).clone().try_cast::<NativeCallback>())
        .ok_or_else(|| runtime_error(format!("{HOST_CALLBACK_FN} called without a callback")))?;

    let arguments = CallbackArguments {
        args: args[1..].iter().map(|arg| arg.flatten_clone()).collect(),
        engine,
    };
    trace!(engine = arguments.engine.id(), args = arguments.len(), "Invoking native callback");

    match (callback.0)(&arguments) {
        Ok(value) => {
            value.check_owner(arguments.engine.id());
            Ok(value.into_dynamic())
        }
        Err(err) => Err(err.into_eval_error()),
    }
}

#[cfg(test)]
mod tests {
    use crate::{AppInfo, Engine, ScriptError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_callback_receives_arguments() {
        let engine = Engine::new(AppInfo::default()).unwrap();
        let callback = engine
            .new_callback(|args| {
                let engine = Engine::from_arguments(args);
                let values = engine.convert_arguments(args);
                let sum = values.iter().map(|v| v.as_int()).sum::<Result<i64, _>>()?;
                Ok(engine.new_value(sum))
            })
            .unwrap();
        engine.set_global_property("sum", &callback).unwrap();

        let result = engine.evaluate("sum.call(1, 2, 3)", None).unwrap();
        assert_eq!(result.as_int().unwrap(), 6);
    }

    #[test]
    fn test_callback_without_arguments() {
        let engine = Engine::new(AppInfo::default()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let callback = engine
            .new_callback(move |args| {
                assert!(args.is_empty());
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Engine::from_arguments(args).new_value(true))
            })
            .unwrap();
        engine.set_global_property("ping", &callback).unwrap();

        assert!(engine.evaluate("call(ping)", None).unwrap().as_bool().unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_error_becomes_script_error() {
        let engine = Engine::new(AppInfo::default()).unwrap();
        let callback = engine
            .new_callback(|_| Err(ScriptError::callback("rejected")))
            .unwrap();
        engine.set_global_property("fail", &callback).unwrap();

        let err = engine.evaluate("fail.call()", Some("cb.rhai")).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { .. }));
        assert!(err.to_string().contains("rejected"));

        // Script code can catch it
        let caught = engine
            .evaluate(
                "let caught = false; try { fail.call(); } catch (e) { caught = true; } caught",
                None,
            )
            .unwrap();
        assert!(caught.as_bool().unwrap());
    }

    #[test]
    fn test_callback_called_from_host() {
        let engine = Engine::new(AppInfo::default()).unwrap();
        let callback = engine
            .new_callback(|args| {
                let engine = Engine::from_arguments(args);
                let values = engine.convert_arguments(args);
                Ok(engine.new_value(format!("hello {}", values[0].as_string()?)))
            })
            .unwrap();

        let result = callback.call(&[engine.new_value("host")]).unwrap();
        assert_eq!(result.as_string().unwrap(), "hello host");
    }

    #[test]
    fn test_host_callback_requires_callback_argument() {
        let engine = Engine::new(AppInfo::default()).unwrap();
        let err = engine.evaluate("host_callback(1, 2)", None).unwrap_err();
        assert!(err.is_script_error());
    }
}
