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

//! A configurable JSON encoder for field mappings.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::ErrorKind;
use crate::kv::Map;
use crate::kv::Opaque;
use crate::kv::Value;

/// A hook converting an opaque value into JSON.
///
/// Hooks are shared by every record a formatter handles, possibly from several threads at once.
pub type DefaultHook = Arc<dyn Fn(&Opaque) -> Result<serde_json::Value, Error> + Send + Sync>;

/// A table of named [`DefaultHook`]s, used to resolve [`EncoderOptions::default`].
#[derive(Clone, Default)]
pub struct Hooks {
    hooks: BTreeMap<String, DefaultHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.hooks.keys()).finish()
    }
}

impl Hooks {
    /// Create a table with no hooks.
    pub fn new() -> Self {
        Hooks::default()
    }

    /// Create a table with the built-in hooks:
    ///
    /// * `repr`: the `Debug` representation of the object, as a string.
    /// * `null`: always `null`.
    pub fn builtin() -> Self {
        Hooks::new()
            .register("repr", |o: &Opaque| Ok(o.repr().into()))
            .register("null", |_: &Opaque| Ok(serde_json::Value::Null))
    }

    /// Register a hook under a name, replacing any hook of the same name.
    pub fn register(
        mut self,
        name: impl Into<String>,
        hook: impl Fn(&Opaque) -> Result<serde_json::Value, Error> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.insert(name.into(), Arc::new(hook));
        self
    }

    /// Get a hook by name.
    pub fn get(&self, name: &str) -> Option<&DefaultHook> {
        self.hooks.get(name)
    }
}

/// The declarative options of a [`JsonEncoder`].
///
/// Unknown options are rejected.
///
/// ```json
/// {"indent": 2, "separators": [" , ", " : "], "sort_keys": false, "default": "repr"}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncoderOptions {
    /// Indent nested values by this many spaces per level, one item per line. `None` renders on
    /// one line.
    #[serde(default)]
    pub indent: Option<usize>,
    /// The item separator and the key separator.
    #[serde(default)]
    pub separators: Option<(String, String)>,
    /// Sort object keys instead of keeping insertion order.
    #[serde(default)]
    pub sort_keys: bool,
    /// Escape every non-ASCII character as `\uXXXX`.
    #[serde(default)]
    pub ensure_ascii: bool,
    /// The name of the hook converting opaque values.
    #[serde(default)]
    pub default: Option<String>,
}

impl EncoderOptions {
    /// Deserialize options from a declarative mapping.
    ///
    /// # Errors
    ///
    /// Return an error of kind [`ErrorKind::InvalidConfig`] for unknown options and ill-typed
    /// values.
    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value)
            .map_err(|err| Error::from_config_error("json encoder options", err))
    }
}

/// Serializes [`Value`]s and field mappings to JSON text.
///
/// Without explicit separators, the item separator is `", "` on a single line and `","` when
/// indenting, and the key separator is `": "`.
///
/// # Examples
///
/// ```
/// use jsonlogging::encoder::JsonEncoder;
/// use jsonlogging::kv::Map;
///
/// let map = Map::from_iter([("a", 1), ("b", 2)]);
/// assert_eq!(JsonEncoder::default().encode_map(&map).unwrap(), r#"{"a": 1, "b": 2}"#);
/// assert_eq!(JsonEncoder::compact().encode_map(&map).unwrap(), r#"{"a":1,"b":2}"#);
/// ```
#[derive(Clone, Default)]
pub struct JsonEncoder {
    indent: Option<usize>,
    separators: Option<(String, String)>,
    sort_keys: bool,
    ensure_ascii: bool,
    default: Option<DefaultHook>,
}

impl fmt::Debug for JsonEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonEncoder")
            .field("indent", &self.indent)
            .field("item_separator", &self.item_separator())
            .field("key_separator", &self.key_separator())
            .field("sort_keys", &self.sort_keys)
            .field("ensure_ascii", &self.ensure_ascii)
            .field("default", &self.default.as_ref().map(|_| "..."))
            .finish()
    }
}

impl JsonEncoder {
    /// An encoder without any whitespace: separators `","` and `":"`.
    pub fn compact() -> Self {
        JsonEncoder::default().with_separators(",", ":")
    }

    /// Build an encoder from declarative options, resolving the default hook in `hooks`.
    ///
    /// # Errors
    ///
    /// Return an error of kind [`ErrorKind::InvalidConfig`] if the hook is not in `hooks`.
    pub fn from_options(options: &EncoderOptions, hooks: &Hooks) -> Result<Self, Error> {
        let default = match &options.default {
            None => None,
            Some(name) => Some(hooks.get(name).cloned().ok_or_else(|| {
                Error::new(ErrorKind::InvalidConfig, "unknown default hook")
                    .with_context("hook", name)
            })?),
        };

        Ok(JsonEncoder {
            indent: options.indent,
            separators: options.separators.clone(),
            sort_keys: options.sort_keys,
            ensure_ascii: options.ensure_ascii,
            default,
        })
    }

    /// Set the indent width.
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = Some(indent);
        self
    }

    /// Set the item separator and the key separator.
    pub fn with_separators(mut self, item: impl Into<String>, key: impl Into<String>) -> Self {
        self.separators = Some((item.into(), key.into()));
        self
    }

    /// Set whether object keys are sorted.
    pub fn with_sort_keys(mut self, sort_keys: bool) -> Self {
        self.sort_keys = sort_keys;
        self
    }

    /// Set whether non-ASCII characters are escaped.
    pub fn with_ensure_ascii(mut self, ensure_ascii: bool) -> Self {
        self.ensure_ascii = ensure_ascii;
        self
    }

    /// Set the hook converting opaque values.
    ///
    /// # Examples
    ///
    /// ```
    /// use jsonlogging::encoder::JsonEncoder;
    /// use jsonlogging::kv::Opaque;
    ///
    /// let encoder = JsonEncoder::default()
    ///     .with_default(|o: &Opaque| Ok(serde_json::json!({ "type": o.type_name() })));
    /// ```
    pub fn with_default(
        mut self,
        hook: impl Fn(&Opaque) -> Result<serde_json::Value, Error> + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(Arc::new(hook));
        self
    }

    /// The indent width, if indenting.
    pub fn indent(&self) -> Option<usize> {
        self.indent
    }

    /// The separator written between items.
    pub fn item_separator(&self) -> &str {
        match (&self.separators, self.indent) {
            (Some((item, _)), _) => item,
            (None, Some(_)) => ",",
            (None, None) => ", ",
        }
    }

    /// The separator written between a key and its value.
    pub fn key_separator(&self) -> &str {
        match &self.separators {
            Some((_, key)) => key,
            None => ": ",
        }
    }

    /// Whether object keys are sorted.
    pub fn sort_keys(&self) -> bool {
        self.sort_keys
    }

    /// Whether non-ASCII characters are escaped.
    pub fn ensure_ascii(&self) -> bool {
        self.ensure_ascii
    }

    /// The hook converting opaque values, if any.
    pub fn default_hook(&self) -> Option<&DefaultHook> {
        self.default.as_ref()
    }

    /// Encode a value.
    ///
    /// # Errors
    ///
    /// Return an error of kind [`ErrorKind::Unserializable`] if the value contains an opaque
    /// value that no hook converts, or a NaN or infinite float.
    pub fn encode(&self, value: &Value) -> Result<String, Error> {
        let json = self.to_json(value, false)?;
        self.write(&json)
    }

    /// Encode a field mapping as a JSON object.
    ///
    /// # Errors
    ///
    /// See [`JsonEncoder::encode`].
    pub fn encode_map(&self, map: &Map) -> Result<String, Error> {
        let json = serde_json::Value::Object(self.to_json_map(map, false)?);
        self.write(&json)
    }

    /// Encode a field mapping, coercing whatever has no JSON form into a string.
    ///
    /// Opaque values that no hook converts become their `Debug` representation. Non-finite
    /// floats become `"NaN"`, `"Infinity"` or `"-Infinity"`.
    pub fn encode_map_lossy(&self, map: &Map) -> Result<String, Error> {
        let json = serde_json::Value::Object(self.to_json_map(map, true)?);
        self.write(&json)
    }

    fn to_json(&self, value: &Value, lossy: bool) -> Result<serde_json::Value, Error> {
        Ok(match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => (*b).into(),
            Value::I64(n) => (*n).into(),
            Value::U64(n) => (*n).into(),
            Value::F64(n) => match serde_json::Number::from_f64(*n) {
                Some(n) => serde_json::Value::Number(n),
                None if lossy => non_finite_name(*n).into(),
                None => {
                    return Err(Error::new(
                        ErrorKind::Unserializable,
                        "out of range float values are not JSON compliant",
                    )
                    .with_context("value", n));
                }
            },
            Value::String(s) => s.as_str().into(),
            Value::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| self.to_json(item, lossy))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => serde_json::Value::Object(self.to_json_map(map, lossy)?),
            Value::Opaque(o) => match &self.default {
                Some(hook) => match hook(o) {
                    // hook output follows the same key order as the rest of the document
                    Ok(json) if self.sort_keys => self.to_json(&Value::from(json), lossy)?,
                    Ok(json) => json,
                    Err(_) if lossy => o.repr().into(),
                    Err(err) => {
                        return Err(Error::new(
                            ErrorKind::Unserializable,
                            "default hook failed to convert object",
                        )
                        .with_context("type", o.type_name())
                        .with_source(err));
                    }
                },
                None if lossy => o.repr().into(),
                None => {
                    return Err(Error::new(
                        ErrorKind::Unserializable,
                        "object is not JSON serializable",
                    )
                    .with_context("type", o.type_name()));
                }
            },
        })
    }

    fn to_json_map(
        &self,
        map: &Map,
        lossy: bool,
    ) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
        let mut entries = map.iter().collect::<Vec<_>>();
        if self.sort_keys {
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        }

        let mut json = serde_json::Map::with_capacity(entries.len());
        for (key, value) in entries {
            json.insert(key.to_owned(), self.to_json(value, lossy)?);
        }
        Ok(json)
    }

    fn write(&self, json: &serde_json::Value) -> Result<String, Error> {
        let mut buf = Vec::with_capacity(128);
        let formatter = SeparatorFormatter {
            current_indent: 0,
            has_value: false,
            indent: self.indent,
            item_separator: self.item_separator().as_bytes(),
            key_separator: self.key_separator().as_bytes(),
            ensure_ascii: self.ensure_ascii,
        };

        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        json.serialize(&mut serializer).map_err(|err| {
            Error::new(ErrorKind::Unserializable, "failed to serialize json").with_source(err)
        })?;

        String::from_utf8(buf).map_err(|err| {
            Error::new(ErrorKind::Unexpected, "serialized json is not utf-8").with_source(err)
        })
    }
}

fn non_finite_name(n: f64) -> &'static str {
    if n.is_nan() {
        "NaN"
    } else if n.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

/// Writes JSON with configurable separators and indentation.
///
/// When indenting, every item goes on its own line and the item separator precedes the line
/// break. Empty containers stay `[]` and `{}`.
struct SeparatorFormatter<'a> {
    current_indent: usize,
    has_value: bool,
    indent: Option<usize>,
    item_separator: &'a [u8],
    key_separator: &'a [u8],
    ensure_ascii: bool,
}

impl SeparatorFormatter<'_> {
    fn newline<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if let Some(width) = self.indent {
            writer.write_all(b"\n")?;
            for _ in 0..self.current_indent * width {
                writer.write_all(b" ")?;
            }
        }
        Ok(())
    }

    fn begin_item<W>(&self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !first {
            writer.write_all(self.item_separator)?;
        }
        self.newline(writer)
    }
}

impl serde_json::ser::Formatter for SeparatorFormatter<'_> {
    fn begin_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.current_indent += 1;
        self.has_value = false;
        writer.write_all(b"[")
    }

    fn end_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.current_indent -= 1;
        if self.has_value {
            self.newline(writer)?;
        }
        writer.write_all(b"]")
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.begin_item(writer, first)
    }

    fn end_array_value<W>(&mut self, _writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.current_indent += 1;
        self.has_value = false;
        writer.write_all(b"{")
    }

    fn end_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.current_indent -= 1;
        if self.has_value {
            self.newline(writer)?;
        }
        writer.write_all(b"}")
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.begin_item(writer, first)
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(self.key_separator)
    }

    fn end_object_value<W>(&mut self, _writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.has_value = true;
        Ok(())
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !self.ensure_ascii || fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }

        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Handle(u32);

    fn sample() -> Map {
        let mut nested = Map::new();
        nested.insert("x", Value::Null);
        Map::from_iter([
            ("a", Value::from(1)),
            ("b", Value::from(vec![1, 2])),
            ("c", Value::Object(Map::new())),
            ("d", Value::Object(nested)),
        ])
    }

    #[test]
    fn test_default_separators() {
        let encoder = JsonEncoder::default();
        assert_eq!(encoder.item_separator(), ", ");
        assert_eq!(encoder.key_separator(), ": ");
        assert_eq!(
            encoder.encode_map(&sample()).unwrap(),
            r#"{"a": 1, "b": [1, 2], "c": {}, "d": {"x": null}}"#
        );
    }

    #[test]
    fn test_compact() {
        assert_eq!(
            JsonEncoder::compact().encode_map(&sample()).unwrap(),
            r#"{"a":1,"b":[1,2],"c":{},"d":{"x":null}}"#
        );
    }

    #[test]
    fn test_indent_with_custom_separators() {
        let encoder = JsonEncoder::default()
            .with_indent(2)
            .with_separators(" , ", " : ");
        assert_eq!(encoder.indent(), Some(2));
        assert_eq!(encoder.item_separator(), " , ");
        assert_eq!(encoder.key_separator(), " : ");

        let expected = "{\n  \"a\" : 1 , \n  \"b\" : [\n    1 , \n    2\n  ] , \n  \"c\" : {} , \n  \"d\" : {\n    \"x\" : null\n  }\n}";
        assert_eq!(encoder.encode_map(&sample()).unwrap(), expected);
    }

    #[test]
    fn test_indent_zero_uses_newlines_only() {
        let encoder = JsonEncoder::default().with_indent(0);
        assert_eq!(encoder.item_separator(), ",");
        let map = Map::from_iter([("a", 1), ("b", 2)]);
        assert_eq!(encoder.encode_map(&map).unwrap(), "{\n\"a\": 1,\n\"b\": 2\n}");
    }

    #[test]
    fn test_sort_keys() {
        let map = Map::from_iter([("b", 1), ("a", 2), ("c", 3)]);
        let encoder = JsonEncoder::compact().with_sort_keys(true);
        assert_eq!(encoder.encode_map(&map).unwrap(), r#"{"a":2,"b":1,"c":3}"#);
    }

    #[test]
    fn test_ensure_ascii() {
        let value = Value::from("café 😀 \"q\"");
        assert_eq!(JsonEncoder::default().encode(&value).unwrap(), "\"café 😀 \\\"q\\\"\"");
        assert_eq!(
            JsonEncoder::default().with_ensure_ascii(true).encode(&value).unwrap(),
            "\"caf\\u00e9 \\ud83d\\ude00 \\\"q\\\"\""
        );
    }

    #[test]
    fn test_opaque_without_hook_fails() {
        let map = Map::from_iter([("conn", Value::opaque(Handle(7)))]);
        let err = JsonEncoder::compact().encode_map(&map).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unserializable);
        assert_eq!(err.message(), "object is not JSON serializable");

        assert_eq!(
            JsonEncoder::compact().encode_map_lossy(&map).unwrap(),
            r#"{"conn":"Handle(7)"}"#
        );
    }

    #[test]
    fn test_opaque_with_hook() {
        let encoder = JsonEncoder::compact().with_default(|o: &Opaque| {
            match o.downcast_ref::<Handle>() {
                Some(handle) => Ok(serde_json::json!({ "handle": handle.0 })),
                None => Err(Error::new(ErrorKind::Unserializable, "unknown object")),
            }
        });

        let map = Map::from_iter([("conn", Value::opaque(Handle(7)))]);
        assert_eq!(encoder.encode_map(&map).unwrap(), r#"{"conn":{"handle":7}}"#);

        let map = Map::from_iter([("other", Value::opaque(vec![1u8]))]);
        let err = encoder.encode_map(&map).unwrap_err();
        assert_eq!(err.message(), "default hook failed to convert object");
        assert_eq!(encoder.encode_map_lossy(&map).unwrap(), r#"{"other":"[1]"}"#);
    }

    #[test]
    fn test_sort_keys_applies_to_hook_output() {
        let encoder = JsonEncoder::compact()
            .with_sort_keys(true)
            .with_default(|_: &Opaque| Ok(serde_json::json!({ "z": 1, "a": { "y": 2, "b": 3 } })));

        let map = Map::from_iter([("b", Value::opaque(Handle(7))), ("a", Value::from(0))]);
        assert_eq!(
            encoder.encode_map(&map).unwrap(),
            r#"{"a":0,"b":{"a":{"b":3,"y":2},"z":1}}"#
        );

        let encoder = JsonEncoder::compact()
            .with_default(|_: &Opaque| Ok(serde_json::json!({ "z": 1, "a": 2 })));
        assert_eq!(encoder.encode_map(&map).unwrap(), r#"{"b":{"z":1,"a":2},"a":0}"#);
    }

    #[test]
    fn test_non_finite_floats() {
        let map = Map::from_iter([("ratio", f64::NAN), ("max", f64::INFINITY)]);
        let err = JsonEncoder::compact().encode_map(&map).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unserializable);
        assert_eq!(
            JsonEncoder::compact().encode_map_lossy(&map).unwrap(),
            r#"{"ratio":"NaN","max":"Infinity"}"#
        );
    }

    #[test]
    fn test_options_from_value() {
        let options = EncoderOptions::from_value(serde_json::json!({
            "indent": 2,
            "separators": [" , ", " : "],
            "default": "repr",
        }))
        .unwrap();
        let encoder = JsonEncoder::from_options(&options, &Hooks::builtin()).unwrap();
        assert_eq!(encoder.indent(), Some(2));
        assert_eq!(encoder.item_separator(), " , ");
        assert_eq!(encoder.key_separator(), " : ");
        assert!(encoder.default_hook().is_some());

        let options = EncoderOptions::from_value(serde_json::json!({})).unwrap();
        assert_eq!(options, EncoderOptions::default());
    }

    #[test]
    fn test_options_rejected() {
        let err = EncoderOptions::from_value(serde_json::json!({ "indnet": 2 })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let err = EncoderOptions::from_value(serde_json::json!({ "separators": [","] })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let err = EncoderOptions::from_value(serde_json::json!({ "indent": -1 })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let options = EncoderOptions {
            default: Some("missing".to_string()),
            ..Default::default()
        };
        let err = JsonEncoder::from_options(&options, &Hooks::builtin()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert_eq!(err.to_string(), "unknown default hook, context: { hook: missing }");
    }

    #[test]
    fn test_builtin_hooks() {
        let map = Map::from_iter([("conn", Value::opaque(Handle(7)))]);
        let hooks = Hooks::builtin();
        for (name, expected) in [("repr", r#"{"conn":"Handle(7)"}"#), ("null", r#"{"conn":null}"#)] {
            let options = EncoderOptions {
                separators: Some((",".to_string(), ":".to_string())),
                default: Some(name.to_string()),
                ..Default::default()
            };
            let encoder = JsonEncoder::from_options(&options, &hooks).unwrap();
            assert_eq!(encoder.encode_map(&map).unwrap(), expected);
        }
    }
}
