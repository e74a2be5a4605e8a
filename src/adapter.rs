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

//! Adapters turning log records into ordered field mappings.

use std::fmt;

use jiff::tz::TimeZone;

use crate::kv::Map;
use crate::record::Record;
use crate::values::ExceptionMessage;
use crate::values::ExceptionTraceback;
use crate::values::ExceptionType;
use crate::values::Field;
use crate::values::FormattedMessage;
use crate::values::MessageError;
use crate::values::Object;
use crate::values::Timestamp;

/// The ordered mapping an adapter produces for one record. Key order is JSON key order.
pub type FieldMap = Map;

/// Converts a log record into a [`FieldMap`].
///
/// Adapters only read the record. They never fail: problems with the record, such as a message
/// that does not match its arguments, are described in the mapping itself.
pub trait RecordAdapter: fmt::Debug + Send + Sync + 'static {
    /// Adapt a record into its field mapping.
    fn adapt(&self, record: &Record) -> FieldMap;
}

impl<T: RecordAdapter> From<T> for Box<dyn RecordAdapter> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}

/// An adapter rendering an [`Object`] template, followed by the record's extra key-values.
///
/// Extras never replace a key the template produced, and the first of several extras with the
/// same key wins.
#[derive(Debug)]
pub struct ValueRecordAdapter {
    template: Object,
    extras: bool,
}

impl ValueRecordAdapter {
    /// Create an adapter from a template.
    pub fn new(template: Object) -> Self {
        ValueRecordAdapter {
            template,
            extras: true,
        }
    }

    /// Whether to merge the record's extra key-values after the template fields.
    ///
    /// Default to `true`.
    pub fn with_extras(mut self, extras: bool) -> Self {
        self.extras = extras;
        self
    }
}

impl RecordAdapter for ValueRecordAdapter {
    fn adapt(&self, record: &Record) -> FieldMap {
        let mut map = self.template.render_map(record);
        if self.extras {
            for (key, value) in record.key_values() {
                map.insert_if_absent(key, value.clone());
            }
        }
        map
    }
}

/// The default adapter.
///
/// Output fields, in order:
///
/// | key             | value                                                          |
/// |-----------------|----------------------------------------------------------------|
/// | `timestamp`     | ISO 8601 time, UTC unless configured otherwise                 |
/// | `level`         | level name, e.g. `ERROR`                                       |
/// | `logger`        | the record's target                                            |
/// | `message`       | the formatted message, or the raw one if formatting failed     |
/// | `message_error` | why formatting failed; absent otherwise                        |
/// | `location`      | `module`, `file` and `line`, whichever are known               |
/// | `exception`     | `type`, `message` and the rendered `traceback`                 |
///
/// followed by the record's extra key-values.
///
/// # Examples
///
/// ```
/// use jiff::tz::TimeZone;
/// use jsonlogging::adapter::DefaultRecordAdapter;
///
/// let adapter = DefaultRecordAdapter::default()
///     .with_timezone(TimeZone::fixed(jiff::tz::offset(8)))
///     .with_location(false);
/// ```
#[derive(Debug)]
pub struct DefaultRecordAdapter {
    tz: TimeZone,
    location: bool,
    exception: bool,
    inner: ValueRecordAdapter,
}

impl Default for DefaultRecordAdapter {
    fn default() -> Self {
        DefaultRecordAdapter::build(TimeZone::UTC, true, true)
    }
}

impl DefaultRecordAdapter {
    fn build(tz: TimeZone, location: bool, exception: bool) -> Self {
        let mut template = Object::new()
            .entry("timestamp", Timestamp::new(tz.clone()))
            .entry("level", Field::Level)
            .entry("logger", Field::Target)
            .entry("message", FormattedMessage)
            .entry("message_error", MessageError);

        if location {
            template = template.entry(
                "location",
                Object::new()
                    .entry("module", Field::ModulePath)
                    .entry("file", Field::File)
                    .entry("line", Field::Line),
            );
        }

        if exception {
            template = template.entry(
                "exception",
                Object::new()
                    .entry("type", ExceptionType)
                    .entry("message", ExceptionMessage)
                    .entry("traceback", ExceptionTraceback),
            );
        }

        DefaultRecordAdapter {
            tz,
            location,
            exception,
            inner: ValueRecordAdapter::new(template),
        }
    }

    /// Set the timezone for timestamps.
    ///
    /// Default to UTC.
    pub fn with_timezone(self, tz: TimeZone) -> Self {
        DefaultRecordAdapter::build(tz, self.location, self.exception)
    }

    /// Whether to output the `location` object.
    ///
    /// Default to `true`.
    pub fn with_location(self, location: bool) -> Self {
        DefaultRecordAdapter::build(self.tz, location, self.exception)
    }

    /// Whether to output the `exception` object, including its traceback.
    ///
    /// Default to `true`.
    pub fn with_exception(self, exception: bool) -> Self {
        DefaultRecordAdapter::build(self.tz, self.location, exception)
    }
}

impl RecordAdapter for DefaultRecordAdapter {
    fn adapt(&self, record: &Record) -> FieldMap {
        self.inner.adapt(record)
    }
}
