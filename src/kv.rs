// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Values carried by log records and the ordered map they are adapted into.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::map::Entry;

/// A value attached to a log record, either as a positional message argument or as an extra
/// field.
///
/// Every variant except [`Value::Opaque`] has a direct JSON representation.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Array(Vec<Value>),
    Object(Map),
    /// An application object without a JSON form.
    ///
    /// The encoder passes it to its default hook, if any.
    Opaque(Opaque),
}

impl Value {
    /// Capture an arbitrary object that has no JSON representation.
    ///
    /// # Examples
    ///
    /// ```
    /// use jsonlogging::kv::Value;
    ///
    /// #[derive(Debug)]
    /// struct Connection {
    ///     peer: &'static str,
    /// }
    ///
    /// let value = Value::opaque(Connection { peer: "10.0.0.1" });
    /// assert!(value.is_opaque());
    /// ```
    pub fn opaque<T>(value: T) -> Self
    where
        T: Any + fmt::Debug + Send + Sync,
    {
        Value::Opaque(Opaque::new(value))
    }

    /// Whether this value is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is [`Value::Opaque`].
    pub fn is_opaque(&self) -> bool {
        matches!(self, Value::Opaque(_))
    }

    /// Get the string slice if this value is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the nested map if this value is a [`Value::Object`].
    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }
}

/// Renders the value the way it reads inside a log message: strings without quotes, containers
/// as compact JSON and opaque objects with their `Debug` representation.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::F64(n) if !n.is_finite() => fmt::Display::fmt(n, f),
            Value::Opaque(o) => fmt::Debug::fmt(o, f),
            other => fmt::Display::fmt(&other.to_display_json(), f),
        }
    }
}

impl Value {
    // opaque values and non-finite floats become strings
    fn to_display_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => (*b).into(),
            Value::I64(n) => (*n).into(),
            Value::U64(n) => (*n).into(),
            Value::F64(n) => match serde_json::Number::from_f64(*n) {
                Some(n) => serde_json::Value::Number(n),
                None => n.to_string().into(),
            },
            Value::String(s) => s.as_str().into(),
            Value::Array(items) => items.iter().map(Value::to_display_json).collect(),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_display_json()))
                    .collect(),
            ),
            Value::Opaque(o) => o.repr().into(),
        }
    }
}

macro_rules! impl_from_int {
    ($variant:ident: $($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_int!(I64: i8, i16, i32, i64);
impl_from_int!(U64: u8, u16, u32, u64);

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::U64(value as u64)
    }
}

impl From<isize> for Value {
    fn from(value: isize) -> Self {
        Value::I64(value as i64)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F64(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Object(value)
    }
}

impl From<Opaque> for Value {
    fn from(value: Opaque) -> Self {
        Value::Opaque(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(n) = n.as_u64() {
                    Value::U64(n)
                } else if let Some(n) = n.as_i64() {
                    Value::I64(n)
                } else {
                    Value::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Object-safe view of the application object held by an [`Opaque`].
pub trait OpaqueValue: Any + fmt::Debug + Send + Sync {
    /// Upcast to [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Debug + Send + Sync> OpaqueValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A shared handle to an application object that has no JSON representation.
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    inner: Arc<dyn OpaqueValue>,
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

impl Opaque {
    /// Wrap an application object.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + fmt::Debug + Send + Sync,
    {
        Opaque {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    /// The Rust type name of the wrapped object.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The `Debug` representation of the wrapped object.
    pub fn repr(&self) -> String {
        format!("{:?}", self.inner)
    }

    /// Downcast to the concrete type of the wrapped object.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref()
    }
}

/// An ordered string-keyed map.
///
/// Iteration follows insertion order. Inserting an existing key replaces its value in place.
#[derive(Clone, Debug, Default)]
pub struct Map {
    entries: IndexMap<String, Value>,
}

impl Map {
    /// Create an empty map.
    pub fn new() -> Self {
        Map::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a value, returning the previous value of the key if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Insert a value only if the key is absent. Returns whether the value was inserted.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        match self.entries.entry(key.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(value.into());
                true
            }
        }
    }

    /// Get the value of a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Whether the map contains a key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over the keys in order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over the entries in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Map {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Map { entries }
    }
}

impl IntoIterator for Map {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
