//! Script values held by the host

use crate::engine::{Engine, EngineInner};
use crate::error::{Result, ScriptError};
use rhai::{Array, Dynamic, FnPtr, Map};
use std::fmt;
use std::sync::Weak;

/// Back-reference from a value to the engine that produced it
///
/// Weak so that values never keep an engine alive; the generation catches
/// values handed to the wrong engine.
#[derive(Clone)]
pub(crate) struct Owner {
    pub(crate) engine: Weak<EngineInner>,
    pub(crate) generation: u64,
}

/// A value living inside an engine's script runtime
///
/// Values are created by [`Engine`] factory methods, by evaluation and by
/// argument conversion inside callbacks. A value keeps the runtime type it was
/// created with until the host narrows it with one of the `as_*` methods.
///
/// Objects and lists have value semantics: changing a property on a `Value`
/// does not affect copies already handed to script code.
#[derive(Clone)]
pub struct Value {
    value: Dynamic,
    owner: Owner,
}

impl Value {
    pub(crate) fn new(owner: Owner, value: Dynamic) -> Self {
        Self { value, owner }
    }

    /// The engine this value belongs to
    pub fn engine(&self) -> Result<Engine> {
        let inner = self.owner.engine.upgrade();
        debug_assert!(inner.is_some(), "value used after its engine was dropped");
        inner.map(Engine::from_inner).ok_or(ScriptError::EngineDropped)
    }

    /// Panics unless this value was produced by the engine with `generation`
    pub(crate) fn check_owner(&self, generation: u64) {
        assert_eq!(
            self.owner.generation, generation,
            "value passed to an engine other than the one that created it"
        );
    }

    /// Whether this is the unit value (`()`), the runtime's "undefined"
    pub fn is_undefined(&self) -> bool {
        self.value.is_unit()
    }

    /// Whether this is a string
    pub fn is_string(&self) -> bool {
        self.value.is_string()
    }

    /// Whether this is an integer or a float
    pub fn is_number(&self) -> bool {
        self.is_int() || self.is_float()
    }

    /// Whether this is an integer
    pub fn is_int(&self) -> bool {
        self.value.is_int()
    }

    /// Whether this is a float
    pub fn is_float(&self) -> bool {
        self.value.is_float()
    }

    /// Whether this is a boolean
    pub fn is_bool(&self) -> bool {
        self.value.is_bool()
    }

    /// Whether this is an object (property map)
    pub fn is_object(&self) -> bool {
        self.value.is::<Map>()
    }

    /// Whether this is a list
    pub fn is_array(&self) -> bool {
        self.value.is::<Array>()
    }

    /// Whether this is a function that can be called
    pub fn is_function(&self) -> bool {
        self.value.is::<FnPtr>()
    }

    /// Runtime type name of this value
    pub fn type_name(&self) -> &'static str {
        self.value.type_name()
    }

    /// Narrow to a string
    pub fn as_string(&self) -> Result<String> {
        self.value
            .clone()
            .into_string()
            .map_err(|actual| ScriptError::type_mismatch("string", actual))
    }

    /// Narrow to an integer
    pub fn as_int(&self) -> Result<i64> {
        self.value
            .as_int()
            .map_err(|actual| ScriptError::type_mismatch("integer", actual))
    }

    /// Narrow to a float; integers are widened
    pub fn as_float(&self) -> Result<f64> {
        if let Ok(value) = self.value.as_int() {
            return Ok(value as f64);
        }
        self.value
            .as_float()
            .map_err(|actual| ScriptError::type_mismatch("float", actual))
    }

    /// Narrow to a boolean
    pub fn as_bool(&self) -> Result<bool> {
        self.value
            .as_bool()
            .map_err(|actual| ScriptError::type_mismatch("bool", actual))
    }

    /// Narrow to a list of values
    pub fn as_list(&self) -> Result<Vec<Value>> {
        let array = self
            .value
            .read_lock::<Array>()
            .ok_or_else(|| ScriptError::type_mismatch("array", self.type_name()))?;
        Ok(array.iter().map(|item| self.sibling(item.clone())).collect())
    }

    /// Read a property of an object; missing properties are undefined
    pub fn get_property(&self, name: &str) -> Result<Value> {
        let map = self
            .value
            .read_lock::<Map>()
            .ok_or_else(|| ScriptError::type_mismatch("object", self.type_name()))?;
        let property = map.get(name).cloned().unwrap_or(Dynamic::UNIT);
        Ok(self.sibling(property))
    }

    /// Set a property of an object
    pub fn set_property(&mut self, name: &str, value: &Value) -> Result<()> {
        value.check_owner(self.owner.generation);
        let actual = self.type_name();
        let mut map = self
            .value
            .write_lock::<Map>()
            .ok_or_else(|| ScriptError::type_mismatch("object", actual))?;
        map.insert(name.into(), value.value.clone());
        Ok(())
    }

    /// Names of an object's properties
    pub fn own_property_names(&self) -> Result<Vec<String>> {
        let map = self
            .value
            .read_lock::<Map>()
            .ok_or_else(|| ScriptError::type_mismatch("object", self.type_name()))?;
        Ok(map.keys().map(|key| key.to_string()).collect())
    }

    /// Call a function value with `args`
    ///
    /// Works for native callbacks created with [`Engine::new_callback`] and
    /// for function pointers produced by script code.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let function = self
            .value
            .clone()
            .try_cast::<FnPtr>()
            .ok_or_else(|| ScriptError::type_mismatch("function", self.type_name()))?;
        let engine = self.engine()?;
        for arg in args {
            arg.check_owner(self.owner.generation);
        }
        let args = args.iter().map(|arg| arg.value.clone()).collect();
        engine.call_function(&function, args)
    }

    /// Convert to JSON
    pub fn to_json(&self) -> Result<serde_json::Value> {
        rhai::serde::from_dynamic(&self.value).map_err(|e| ScriptError::Serialization {
            message: e.to_string(),
        })
    }

    /// The underlying runtime value
    pub fn as_dynamic(&self) -> &Dynamic {
        &self.value
    }

    /// Unwrap into the underlying runtime value
    pub fn into_dynamic(self) -> Dynamic {
        self.value
    }

    fn sibling(&self, value: Dynamic) -> Value {
        Value::new(self.owner.clone(), value.flatten())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.type_name())
            .field("value", &self.value)
            .field("engine", &self.owner.generation)
            .finish()
    }
}

/// Host types that convert into script values
pub trait IntoScript {
    /// Convert into the runtime representation
    fn into_script(self) -> Dynamic;
}

impl IntoScript for &str {
    fn into_script(self) -> Dynamic {
        Dynamic::from(self.to_string())
    }
}

impl IntoScript for String {
    fn into_script(self) -> Dynamic {
        Dynamic::from(self)
    }
}

impl IntoScript for i64 {
    fn into_script(self) -> Dynamic {
        Dynamic::from(self)
    }
}

impl IntoScript for i32 {
    fn into_script(self) -> Dynamic {
        Dynamic::from(i64::from(self))
    }
}

impl IntoScript for u32 {
    fn into_script(self) -> Dynamic {
        Dynamic::from(i64::from(self))
    }
}

impl IntoScript for bool {
    fn into_script(self) -> Dynamic {
        Dynamic::from(self)
    }
}

impl IntoScript for f64 {
    fn into_script(self) -> Dynamic {
        Dynamic::from(self)
    }
}
