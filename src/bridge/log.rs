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

use std::borrow::Cow;
use std::fmt;

use crate::Append;
use crate::Error;
use crate::append::Stdout;
use crate::kv::Value;
use crate::record::Level;
use crate::record::Record;
use crate::trap::DefaultTrap;
use crate::trap::Trap;

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

struct KvCollector<'a, 'b> {
    kvs: &'b mut Vec<(Cow<'a, str>, Value)>,
}

impl<'kvs> log::kv::VisitSource<'kvs> for KvCollector<'_, '_> {
    fn visit_pair(
        &mut self,
        key: log::kv::Key<'kvs>,
        value: log::kv::Value<'kvs>,
    ) -> Result<(), log::kv::Error> {
        let key = Cow::Owned(key.as_str().to_string());
        match serde_json::to_value(&value) {
            Ok(value) => self.kvs.push((key, value.into())),
            Err(_) => self.kvs.push((key, value.to_string().into())),
        };
        Ok(())
    }
}

/// Convert a [`log::Record`].
///
/// The message is the record's formatted arguments. Key-values are converted through their
/// `serde` representation, or their `Display` text if it fails.
impl<'a> From<&log::Record<'a>> for Record<'a> {
    fn from(record: &log::Record<'a>) -> Self {
        let mut message = String::new();
        let format_error = fmt::write(&mut message, *record.args()).err();

        let mut kvs = Vec::new();
        let mut visitor = KvCollector { kvs: &mut kvs };
        if let Err(err) = record.key_values().visit(&mut visitor) {
            kvs.push((Cow::Borrowed("kv_error"), err.to_string().into()));
        }
        if let Some(err) = format_error {
            let err = Error::from_fmt_error(err);
            kvs.push((Cow::Borrowed("format_error"), err.to_string().into()));
        }

        Record::builder()
            .level(record.level().into())
            .target(record.target())
            .module_path(record.module_path())
            .file(record.file())
            .line(record.line())
            .message(message)
            .key_values(kvs)
            .build()
    }
}

/// A [`log::Log`] implementation that writes every enabled record through its appenders.
///
/// Errors from appenders go to the logger's [`Trap`].
///
/// # Examples
///
/// ```
/// use jsonlogging::append;
/// use jsonlogging::bridge::log::JsonLogger;
///
/// let logger = JsonLogger::new(append::Stderr::default()).with_level(log::LevelFilter::Warn);
///
/// if let Err(err) = logger.try_apply() {
///     eprintln!("failed to set up the log crate: {err}");
/// }
/// log::warn!("disk is almost full");
/// ```
#[derive(Debug)]
pub struct JsonLogger {
    appends: Vec<Box<dyn Append>>,
    level: log::LevelFilter,
    trap: Box<dyn Trap>,
}

/// A logger writing records at `Info` or above to standard output.
impl Default for JsonLogger {
    fn default() -> Self {
        JsonLogger::new(Stdout::default())
    }
}

impl JsonLogger {
    /// Create a logger writing records at `Info` or above to one appender.
    pub fn new(append: impl Into<Box<dyn Append>>) -> Self {
        JsonLogger {
            appends: vec![append.into()],
            level: log::LevelFilter::Info,
            trap: Box::new(DefaultTrap::default()),
        }
    }

    /// Add an appender.
    pub fn append(mut self, append: impl Into<Box<dyn Append>>) -> Self {
        self.appends.push(append.into());
        self
    }

    /// Set the most verbose level written.
    ///
    /// Default to [`log::LevelFilter::Info`].
    pub fn with_level(mut self, level: log::LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Set the trap receiving appender errors.
    ///
    /// Default to [`DefaultTrap`].
    pub fn with_trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    /// Install this logger as the log crate global logger.
    ///
    /// This should be called early in the execution of a Rust program. Any log events that occur
    /// before initialization will be ignored.
    ///
    /// This function sets the global maximum log level to the logger's level.
    ///
    /// # Errors
    ///
    /// Return an error if the log crate global logger has already been set.
    pub fn try_apply(self) -> Result<(), log::SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }

    /// Install this logger as the log crate global logger.
    ///
    /// This should be called early in the execution of a Rust program. Any log events that occur
    /// before initialization will be ignored.
    ///
    /// # Panics
    ///
    /// Panic if the log crate global logger has already been set.
    pub fn apply(self) {
        self.try_apply()
            .expect("JsonLogger::apply must be called before the log crate global logger initialized");
    }
}

impl log::Log for JsonLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !log::Log::enabled(self, record.metadata()) {
            return;
        }

        let record = Record::from(record);
        for append in &self.appends {
            if let Err(err) = append.append(&record) {
                self.trap.trap(&err);
            }
        }
    }

    fn flush(&self) {
        for append in &self.appends {
            if let Err(err) = append.flush() {
                self.trap.trap(&err);
            }
        }
    }
}
