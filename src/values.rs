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

//! Building blocks that pull single values out of a [`Record`].
//!
//! A [`RecordValue`] renders to `None` when the record has nothing to contribute, and an
//! [`Object`] drops such entries. Composing them describes the shape of the JSON document:
//!
//! ```
//! use jsonlogging::adapter::RecordAdapter;
//! use jsonlogging::adapter::ValueRecordAdapter;
//! use jsonlogging::record::Record;
//! use jsonlogging::values::Field;
//! use jsonlogging::values::FormattedMessage;
//! use jsonlogging::values::Object;
//!
//! let adapter = ValueRecordAdapter::new(
//!     Object::new()
//!         .entry("msg", FormattedMessage)
//!         .entry("src", Object::new().entry("line", Field::Line)),
//! );
//!
//! let record = Record::builder().message("hi").build();
//! let map = adapter.adapt(&record);
//! assert_eq!(map.keys().collect::<Vec<_>>(), ["msg"]);
//! ```

use std::fmt;
use std::time::SystemTime;

use jiff::tz::TimeZone;

use crate::kv::Map;
use crate::kv::Value;
use crate::record::Record;

/// A value derived from a log record.
pub trait RecordValue: fmt::Debug + Send + Sync + 'static {
    /// Render the value, or `None` if the record has no such value.
    fn render(&self, record: &Record) -> Option<Value>;
}

impl<T: RecordValue> From<T> for Box<dyn RecordValue> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}

/// A plain attribute of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Level,
    /// The logger name.
    Target,
    ModulePath,
    File,
    Line,
    /// The message before argument substitution.
    RawMessage,
    /// The positional arguments, as an array. `None` when there are none.
    Args,
}

impl RecordValue for Field {
    fn render(&self, record: &Record) -> Option<Value> {
        match self {
            Field::Level => Some(record.level().name().into()),
            Field::Target => Some(record.target().into()),
            Field::ModulePath => record.module_path().map(Value::from),
            Field::File => record.file().map(Value::from),
            Field::Line => record.line().map(Value::from),
            Field::RawMessage => Some(record.message().into()),
            Field::Args => {
                let args = record.args();
                (!args.is_empty()).then(|| Value::Array(args.to_vec()))
            }
        }
    }
}

/// The observed time of the record in ISO 8601 format, with microsecond precision.
///
/// Defaults to UTC, e.g. `2013-06-26T10:06:08.878024+00:00`. The fraction is omitted when it is
/// zero, e.g. `1970-01-01T00:00:01+00:00`. Times beyond the representable range are clamped to
/// its bounds.
#[derive(Debug, Clone)]
pub struct Timestamp {
    tz: TimeZone,
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp { tz: TimeZone::UTC }
    }
}

impl Timestamp {
    /// Render timestamps in the given time zone.
    pub fn new(tz: TimeZone) -> Self {
        Timestamp { tz }
    }
}

impl RecordValue for Timestamp {
    fn render(&self, record: &Record) -> Option<Value> {
        let time = record.time();
        let ts = jiff::Timestamp::try_from(time).unwrap_or(if time < SystemTime::UNIX_EPOCH {
            jiff::Timestamp::MIN
        } else {
            jiff::Timestamp::MAX
        });
        let offset = self.tz.to_offset(ts);
        let display = ts.display_with_offset(offset);
        let rendered = if ts.subsec_microsecond() == 0 {
            format!("{display:.0}")
        } else {
            format!("{display:.6}")
        };
        Some(rendered.into())
    }
}

/// The message with its positional arguments substituted.
///
/// If substitution fails, renders the raw message instead; pair it with [`MessageError`] to
/// record why.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormattedMessage;

impl RecordValue for FormattedMessage {
    fn render(&self, record: &Record) -> Option<Value> {
        match record.formatted_message() {
            Ok(message) => Some(message.into()),
            Err(_) => Some(record.message().into()),
        }
    }
}

/// Describes why message substitution failed, or `None` if it succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageError;

impl RecordValue for MessageError {
    fn render(&self, record: &Record) -> Option<Value> {
        record
            .formatted_message()
            .err()
            .map(|err| err.to_string().into())
    }
}

/// The type name of the record's exception.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionType;

impl RecordValue for ExceptionType {
    fn render(&self, record: &Record) -> Option<Value> {
        record.exception().map(|e| e.type_name().into())
    }
}

/// The message of the record's exception.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionMessage;

impl RecordValue for ExceptionMessage {
    fn render(&self, record: &Record) -> Option<Value> {
        record.exception().map(|e| e.message().into())
    }
}

/// The rendered traceback of the record's exception, as a single string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionTraceback;

impl RecordValue for ExceptionTraceback {
    fn render(&self, record: &Record) -> Option<Value> {
        record.exception().map(|e| e.render().into())
    }
}

/// An ordered JSON object whose entries are other [`RecordValue`]s.
///
/// Entries rendering to `None` are dropped, and an object with no remaining entries renders to
/// `None` itself, so empty sections vanish from the output.
#[derive(Debug, Default)]
pub struct Object {
    entries: Vec<(String, Box<dyn RecordValue>)>,
}

impl Object {
    /// Create an object with no entries.
    pub fn new() -> Self {
        Object::default()
    }

    /// Append an entry. Entry order is the key order of the rendered object.
    pub fn entry(mut self, name: impl Into<String>, value: impl Into<Box<dyn RecordValue>>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    /// Render to a map, which is empty when no entry produced a value.
    pub fn render_map(&self, record: &Record) -> Map {
        let mut map = Map::new();
        for (name, value) in &self.entries {
            if let Some(value) = value.render(record) {
                map.insert(name.as_str(), value);
            }
        }
        map
    }
}

impl RecordValue for Object {
    fn render(&self, record: &Record) -> Option<Value> {
        let map = self.render_map(record);
        (!map.is_empty()).then_some(Value::Object(map))
    }
}

type RenderFunction = dyn Fn(&Record) -> Option<Value> + Send + Sync + 'static;

/// A value backed by a closure.
///
/// ```
/// use jsonlogging::kv::Value;
/// use jsonlogging::record::Record;
/// use jsonlogging::values::CustomValue;
///
/// let host = CustomValue::new(|_: &Record| Some(Value::from("web-1")));
/// ```
pub struct CustomValue {
    f: Box<RenderFunction>,
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CustomValue {{ ... }}")
    }
}

impl CustomValue {
    pub fn new(f: impl Fn(&Record) -> Option<Value> + Send + Sync + 'static) -> Self {
        CustomValue { f: Box::new(f) }
    }
}

impl RecordValue for CustomValue {
    fn render(&self, record: &Record) -> Option<Value> {
        (self.f)(record)
    }
}
