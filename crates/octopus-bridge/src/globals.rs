//! Functions and constants visible to every script
//!
//! Everything here goes through the engine's current ports at call time, so
//! swapping a port affects the next script call. Port failures surface as
//! runtime errors at the script call site.

use crate::callback::{engine_from_context, MAX_CALLBACK_ARGS};
use crate::engine::{Engine, EngineInner};
use crate::error::runtime_error;
use crate::ports::{HttpRequest, HttpResponse, LogLevel};
use rhai::{Dynamic, EvalAltResult, Map, NativeCallContext, INT};
use std::any::TypeId;
use std::sync::Weak;

/// Name of the constant holding the [`AppInfo`](crate::AppInfo) object
pub(crate) const APP_INFO_GLOBAL: &str = "app_info";

const SCRIPT_SOURCE: &str = "script";

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

#[allow(deprecated)]
pub(crate) fn register(runtime: &mut rhai::Engine, engine: Weak<EngineInner>) {
    let print_engine = engine.clone();
    runtime.on_print(move |text| {
        if let Some(inner) = print_engine.upgrade() {
            inner.log_system().log(LogLevel::Info, text, SCRIPT_SOURCE);
        }
    });
    runtime.on_debug(move |text, source, _| {
        if let Some(inner) = engine.upgrade() {
            inner
                .log_system()
                .log(LogLevel::Trace, text, source.unwrap_or(SCRIPT_SOURCE));
        }
    });

    // Event name plus up to MAX_CALLBACK_ARGS parameters
    for arity in 1..=MAX_CALLBACK_ARGS + 1 {
        let arg_types = vec![TypeId::of::<Dynamic>(); arity];
        runtime.register_raw_fn("trigger_event", arg_types, trigger_event);
    }

    runtime
        .register_fn("log", log)
        .register_fn("storage_read", storage_read)
        .register_fn("storage_write", storage_write)
        .register_fn("storage_remove", storage_remove)
        .register_fn("storage_stat", storage_stat)
        .register_fn("web_request", web_request)
        .register_fn("web_request", web_request_simple);
}

fn trigger_event(ctx: NativeCallContext<'_>, args: &mut [&mut Dynamic]) -> ScriptResult<Dynamic> {
    let engine = engine_from_context(&ctx)?;
    let name = args
        .first()
        .and_then(|first| (**first).clone().into_string().ok())
        .ok_or_else(|| runtime_error("trigger_event expects an event name string"))?;
    let params: Vec<_> = args[1..]
        .iter()
        .map(|arg| engine.value(arg.flatten_clone()))
        .collect();
    Ok(Dynamic::from(engine.trigger_event(&name, &params)))
}

fn log(ctx: NativeCallContext<'_>, level: &str, message: Dynamic) -> ScriptResult<()> {
    let engine = engine_from_context(&ctx)?;
    let level: LogLevel = level.parse().map_err(runtime_error)?;
    engine
        .log_system()
        .log(level, &message.to_string(), source_of(&ctx));
    Ok(())
}

fn storage_read(ctx: NativeCallContext<'_>, path: &str) -> ScriptResult<String> {
    let engine = engine_from_context(&ctx)?;
    let data = engine
        .file_system()
        .read(path)
        .map_err(|e| runtime_error(e.to_string()))?;
    String::from_utf8(data)
        .map_err(|e| runtime_error(format!("Stored content of '{path}' is not text: {e}")))
}

fn storage_write(ctx: NativeCallContext<'_>, path: &str, content: &str) -> ScriptResult<()> {
    let engine = engine_from_context(&ctx)?;
    engine
        .file_system()
        .write(path, content.as_bytes())
        .map_err(|e| runtime_error(e.to_string()))
}

fn storage_remove(ctx: NativeCallContext<'_>, path: &str) -> ScriptResult<()> {
    let engine = engine_from_context(&ctx)?;
    engine
        .file_system()
        .remove(path)
        .map_err(|e| runtime_error(e.to_string()))
}

fn storage_stat(ctx: NativeCallContext<'_>, path: &str) -> ScriptResult<Map> {
    let engine = engine_from_context(&ctx)?;
    let stat = engine
        .file_system()
        .stat(path)
        .map_err(|e| runtime_error(e.to_string()))?;

    let mut map = Map::new();
    map.insert("exists".into(), stat.exists.into());
    map.insert("is_file".into(), stat.is_file.into());
    map.insert("is_directory".into(), stat.is_directory.into());
    map.insert("last_modified".into(), (stat.last_modified as INT).into());
    Ok(map)
}

fn web_request(
    ctx: NativeCallContext<'_>,
    method: &str,
    url: &str,
    headers: Map,
    body: &str,
) -> ScriptResult<Map> {
    let engine = engine_from_context(&ctx)?;
    let method = http::Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| runtime_error(format!("Invalid HTTP method '{method}': {e}")))?;

    let mut request = HttpRequest::new(method, url).with_body(body.to_string());
    for (name, value) in headers {
        request = request.with_header(name.to_string(), value.to_string());
    }
    send(&engine, &request)
}

fn web_request_simple(ctx: NativeCallContext<'_>, method: &str, url: &str) -> ScriptResult<Map> {
    web_request(ctx, method, url, Map::new(), "")
}

fn send(engine: &Engine, request: &HttpRequest) -> ScriptResult<Map> {
    let response = engine
        .web_request()
        .request(request)
        .map_err(|e| runtime_error(e.to_string()))?;
    Ok(response_map(response))
}

fn response_map(response: HttpResponse) -> Map {
    let body = response.body_string();
    let headers: Map = response
        .headers
        .into_iter()
        .map(|(name, value)| (name.into(), Dynamic::from(value)))
        .collect();

    let mut map = Map::new();
    map.insert("status".into(), (response.status as INT).into());
    map.insert("headers".into(), headers.into());
    map.insert("body".into(), body.into());
    map
}

fn source_of<'a>(ctx: &'a NativeCallContext<'_>) -> &'a str {
    ctx.call_source().unwrap_or(SCRIPT_SOURCE)
}
