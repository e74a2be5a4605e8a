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

//! Log record and exception information.

use std::backtrace::Backtrace;
use std::backtrace::BacktraceStatus;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::SystemTime;

use crate::Error;
use crate::ErrorKind;
use crate::kv::Value;

/// The payload of a log message.
///
/// A record is created per log statement, borrowed by the formatter for the duration of one
/// `format` call and dropped afterwards.
#[derive(Debug)]
pub struct Record<'a> {
    // the observed time
    now: SystemTime,

    // the metadata
    level: Level,
    target: &'a str,
    module_path: Option<&'a str>,
    file: Option<&'a str>,
    line: Option<u32>,

    // the payload
    message: Cow<'a, str>,
    args: Vec<Value>,
    exception: Option<ExceptionInfo>,

    // structural logging
    kvs: Vec<(Cow<'a, str>, Value)>,

    // the message with arguments substituted, computed on first use
    interpolated: OnceLock<Result<String, Error>>,
}

impl Clone for Record<'_> {
    fn clone(&self) -> Self {
        Record {
            now: self.now,
            level: self.level,
            target: self.target,
            module_path: self.module_path,
            file: self.file,
            line: self.line,
            message: self.message.clone(),
            args: self.args.clone(),
            exception: self.exception.clone(),
            kvs: self.kvs.clone(),
            interpolated: OnceLock::new(),
        }
    }
}

impl<'a> Record<'a> {
    /// The observed time.
    pub fn time(&self) -> SystemTime {
        self.now
    }

    /// The verbosity level of the message.
    pub fn level(&self) -> Level {
        self.level
    }

    /// The name of the logger that emitted the record.
    pub fn target(&self) -> &'a str {
        self.target
    }

    /// The module path of the message.
    pub fn module_path(&self) -> Option<&'a str> {
        self.module_path
    }

    /// The source file containing the message.
    pub fn file(&self) -> Option<&'a str> {
        self.file
    }

    /// The line containing the message.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// The raw message, before positional arguments are substituted.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The positional arguments of the message.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The exception attached to the record, if any.
    pub fn exception(&self) -> Option<&ExceptionInfo> {
        self.exception.as_ref()
    }

    /// The extra key-values attached by the caller, in insertion order.
    pub fn key_values(&self) -> impl ExactSizeIterator<Item = (&str, &Value)> {
        self.kvs.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// The message with its positional arguments substituted.
    ///
    /// A message without arguments is returned verbatim, so braces in it need no escaping. With
    /// arguments, `{}` takes the next argument, `{N}` takes argument `N`, and `{{`/`}}` are
    /// literal braces.
    ///
    /// # Errors
    ///
    /// Return an error of kind [`ErrorKind::MessageFormat`] if a placeholder has no argument,
    /// an argument is never used, or a brace is unbalanced.
    ///
    /// The substitution runs once per record; later calls return the same result.
    ///
    /// # Examples
    ///
    /// ```
    /// use jsonlogging::record::Record;
    ///
    /// let record = Record::builder()
    ///     .message("{} logged in from {}")
    ///     .arg("alice")
    ///     .arg("10.0.0.1")
    ///     .build();
    /// assert_eq!(record.formatted_message().unwrap(), "alice logged in from 10.0.0.1");
    /// ```
    pub fn formatted_message(&self) -> Result<&str, &Error> {
        if self.args.is_empty() {
            return Ok(&self.message);
        }
        self.interpolated
            .get_or_init(|| interpolate(&self.message, &self.args))
            .as_deref()
    }

    /// Create a builder initialized with the current record's values.
    pub fn to_builder(&self) -> RecordBuilder<'a> {
        RecordBuilder {
            record: self.clone(),
        }
    }

    /// Returns a new builder.
    pub fn builder() -> RecordBuilder<'a> {
        RecordBuilder::default()
    }
}

fn interpolate(template: &str, args: &[Value]) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len());
    let mut used = vec![false; args.len()];
    let mut next = 0;

    let mut chars = template.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|(_, c)| *c == '{').is_some() {
                    out.push('{');
                    continue;
                }

                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) => name.push(c),
                        None => {
                            return Err(Error::new(
                                ErrorKind::MessageFormat,
                                "single '{' encountered in message",
                            )
                            .with_context("position", pos));
                        }
                    }
                }

                let index = if name.is_empty() {
                    next += 1;
                    next - 1
                } else {
                    name.parse::<usize>().map_err(|_| {
                        Error::new(ErrorKind::MessageFormat, "unsupported placeholder in message")
                            .with_context("placeholder", &name)
                    })?
                };

                let Some(arg) = args.get(index) else {
                    return Err(Error::new(
                        ErrorKind::MessageFormat,
                        "not enough arguments for message",
                    )
                    .with_context("index", index)
                    .with_context("args", args.len()));
                };
                used[index] = true;
                out.push_str(&arg.to_string());
            }
            '}' => {
                if chars.next_if(|(_, c)| *c == '}').is_some() {
                    out.push('}');
                    continue;
                }
                return Err(
                    Error::new(ErrorKind::MessageFormat, "single '}' encountered in message")
                        .with_context("position", pos),
                );
            }
            c => out.push(c),
        }
    }

    if let Some(index) = used.iter().position(|used| !used) {
        return Err(Error::new(
            ErrorKind::MessageFormat,
            "not all arguments converted during message formatting",
        )
        .with_context("index", index));
    }

    Ok(out)
}

/// Builder for [`Record`].
#[derive(Debug)]
pub struct RecordBuilder<'a> {
    record: Record<'a>,
}

impl Default for RecordBuilder<'_> {
    fn default() -> Self {
        RecordBuilder {
            record: Record {
                now: SystemTime::now(),
                level: Level::Info,
                target: "",
                module_path: None,
                file: None,
                line: None,
                message: Cow::Borrowed(""),
                args: vec![],
                exception: None,
                kvs: vec![],
                interpolated: OnceLock::new(),
            },
        }
    }
}

impl<'a> RecordBuilder<'a> {
    /// Set [`time`](Record::time).
    pub fn time(mut self, now: SystemTime) -> Self {
        self.record.now = now;
        self
    }

    /// Set [`level`](Record::level).
    pub fn level(mut self, level: Level) -> Self {
        self.record.level = level;
        self
    }

    /// Set [`target`](Record::target).
    pub fn target(mut self, target: &'a str) -> Self {
        self.record.target = target;
        self
    }

    /// Set [`module_path`](Record::module_path).
    pub fn module_path(mut self, path: Option<&'a str>) -> Self {
        self.record.module_path = path;
        self
    }

    /// Set [`file`](Record::file).
    pub fn file(mut self, file: Option<&'a str>) -> Self {
        self.record.file = file;
        self
    }

    /// Set [`line`](Record::line).
    pub fn line(mut self, line: Option<u32>) -> Self {
        self.record.line = line;
        self
    }

    /// Set [`message`](Record::message).
    pub fn message(mut self, message: impl Into<Cow<'a, str>>) -> Self {
        self.record.message = message.into();
        self
    }

    /// Append one positional argument.
    pub fn arg(mut self, arg: impl Into<Value>) -> Self {
        self.record.args.push(arg.into());
        self
    }

    /// Set all positional [`args`](Record::args).
    pub fn args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set [`exception`](Record::exception).
    pub fn exception(mut self, exception: ExceptionInfo) -> Self {
        self.record.exception = Some(exception);
        self
    }

    /// Append one extra key-value.
    pub fn key_value(mut self, key: impl Into<Cow<'a, str>>, value: impl Into<Value>) -> Self {
        self.record.kvs.push((key.into(), value.into()));
        self
    }

    /// Set all extra [`key_values`](Record::key_values).
    pub fn key_values<I, K, V>(mut self, kvs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Cow<'a, str>>,
        V: Into<Value>,
    {
        self.record.kvs = kvs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Invoke the builder and return a `Record`
    pub fn build(self) -> Record<'a> {
        self.record
    }
}

/// An error attached to a log record, with its cause chain and an optional backtrace.
#[derive(Clone, Debug)]
pub struct ExceptionInfo {
    type_name: Cow<'static, str>,
    message: String,
    causes: Vec<String>,
    backtrace: Option<String>,
}

impl ExceptionInfo {
    /// Create exception info from its type name and message.
    pub fn new(type_name: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        ExceptionInfo {
            type_name: type_name.into(),
            message: message.into(),
            causes: vec![],
            backtrace: None,
        }
    }

    /// Capture an error value and the messages of its [`source`](std::error::Error::source)
    /// chain.
    ///
    /// # Examples
    ///
    /// ```
    /// use jsonlogging::record::ExceptionInfo;
    ///
    /// let err = "x".parse::<u32>().unwrap_err();
    /// let info = ExceptionInfo::from_error(&err);
    /// assert_eq!(info.type_name(), "core::num::error::ParseIntError");
    /// assert_eq!(info.message(), "invalid digit found in string");
    /// ```
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        let mut causes = vec![];
        let mut source = err.source();
        while let Some(err) = source {
            causes.push(err.to_string());
            source = err.source();
        }

        ExceptionInfo {
            type_name: Cow::Borrowed(std::any::type_name::<E>()),
            message: err.to_string(),
            causes,
            backtrace: None,
        }
    }

    /// Capture an [`anyhow::Error`], including its backtrace when one was captured.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let backtrace = err.backtrace();
        ExceptionInfo {
            type_name: Cow::Borrowed("anyhow::Error"),
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
            backtrace: match backtrace.status() {
                BacktraceStatus::Captured => Some(backtrace.to_string()),
                _ => None,
            },
        }
    }

    /// Set a rendered backtrace.
    pub fn with_backtrace(mut self, backtrace: impl ToString) -> Self {
        self.backtrace = Some(backtrace.to_string());
        self
    }

    /// Capture the backtrace of the current thread.
    ///
    /// Honors `RUST_BACKTRACE` and `RUST_LIB_BACKTRACE`; nothing is stored when capturing is
    /// disabled.
    pub fn capture_backtrace(mut self) -> Self {
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            self.backtrace = Some(backtrace.to_string());
        }
        self
    }

    /// The type name of the error.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The messages of the errors that caused this one, outermost first.
    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// The rendered backtrace, if any.
    pub fn backtrace(&self) -> Option<&str> {
        self.backtrace.as_deref()
    }

    /// Render the error, its causes and its backtrace as one traceback string.
    ///
    /// ```text
    /// std::io::error::Error: config not readable
    ///
    /// Caused by:
    ///     0: permission denied
    ///
    /// Stack backtrace:
    ///    0: ...
    /// ```
    pub fn render(&self) -> String {
        let mut text = format!("{}: {}", self.type_name, self.message);
        if !self.causes.is_empty() {
            text.push_str("\n\nCaused by:");
            for (i, cause) in self.causes.iter().enumerate() {
                text.push_str(&format!("\n    {i}: {cause}"));
            }
        }
        if let Some(backtrace) = &self.backtrace {
            text.push_str("\n\nStack backtrace:\n");
            text.push_str(backtrace.trim_end());
        }
        text
    }
}

/// An enum representing the available verbosity levels of the logger.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Designates critical errors.
    Crit,
    /// Designates very serious errors.
    Error,
    /// Designates hazardous situations.
    Warn,
    /// Designates useful information.
    Info,
    /// Designates lower priority information.
    Debug,
    /// Designates very low priority, often extremely verbose, information.
    Trace,
}

impl Level {
    /// Return the name of the `Level`.
    ///
    /// This returns the same string as the `fmt::Display` implementation.
    pub fn name(&self) -> &'static str {
        match self {
            Level::Crit => "CRIT",
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Level {
    type Err = Error;
    fn from_str(s: &str) -> Result<Level, Self::Err> {
        for (name, level) in [
            ("crit", Level::Crit),
            ("error", Level::Error),
            ("warn", Level::Warn),
            ("info", Level::Info),
            ("debug", Level::Debug),
            ("trace", Level::Trace),
        ] {
            if s.eq_ignore_ascii_case(name) {
                return Ok(level);
            }
        }

        Err(Error::new(
            ErrorKind::InvalidConfig,
            format!("malformed level: {s:?}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(template: &'static str, args: Vec<Value>) -> Result<String, (ErrorKind, String)> {
        let record = Record::builder().message(template).args(args).build();
        record
            .formatted_message()
            .map(str::to_owned)
            .map_err(|err| (err.kind(), err.message().to_owned()))
    }

    #[test]
    fn test_message_without_args_is_verbatim() {
        assert_eq!(message("{not a placeholder}", vec![]).unwrap(), "{not a placeholder}");
    }

    #[test]
    fn test_message_sequential_and_indexed() {
        let args = vec![Value::from("log"), Value::from("message")];
        assert_eq!(
            message("This is a {} {}.", args.clone()).unwrap(),
            "This is a log message."
        );
        assert_eq!(
            message("{1} before {0}, {{escaped}}", args).unwrap(),
            "message before log, {escaped}"
        );
    }

    #[test]
    fn test_message_mismatch_is_an_error() {
        for (template, args, expected) in [
            ("{} and {}", 1, "not enough arguments for message"),
            ("{}", 2, "not all arguments converted during message formatting"),
            ("open { brace", 1, "single '{' encountered in message"),
            ("close } brace {}", 1, "single '}' encountered in message"),
            ("{name}", 1, "unsupported placeholder in message"),
        ] {
            let args = (0..args).map(Value::from).collect();
            let (kind, message) = message(template, args).unwrap_err();
            assert_eq!(kind, ErrorKind::MessageFormat, "{template}");
            assert_eq!(message, expected, "{template}");
        }
    }

    #[test]
    fn test_message_is_interpolated_once() {
        let record = Record::builder().message("{} {}").arg("a").arg("b").build();
        let first = record.formatted_message().unwrap();
        let second = record.formatted_message().unwrap();
        assert_eq!(first, "a b");
        assert!(std::ptr::eq(first, second));

        // a rebuilt record interpolates its own arguments
        let rebuilt = record.to_builder().args(["c", "d"]).build();
        assert_eq!(rebuilt.formatted_message().unwrap(), "c d");
    }

    #[test]
    fn test_exception_render() {
        let info = ExceptionInfo::new("app::Error", "boom");
        assert_eq!(info.render(), "app::Error: boom");

        let err = anyhow::anyhow!("permission denied").context("config not readable");
        let info = ExceptionInfo::from_anyhow(&err).with_backtrace("   0: main\n");
        assert_eq!(info.message(), "config not readable");
        assert_eq!(info.causes(), ["permission denied"]);
        assert_eq!(
            info.render(),
            "anyhow::Error: config not readable\n\nCaused by:\n    0: permission denied\n\nStack backtrace:\n   0: main"
        );
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("CRIT".parse::<Level>().unwrap(), Level::Crit);
        assert!("verbose".parse::<Level>().is_err());
    }
}
