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

use std::fmt;
use std::io;

/// The kind of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A template, encoder option, hook name or factory name is invalid.
    ///
    /// Returned at construction time, before any record is formatted.
    InvalidConfig,
    /// The message of a record does not match its positional arguments.
    MessageFormat,
    /// A value has no JSON representation under the configured encoder.
    Unserializable,
    /// Any other failure, such as I/O in an appender.
    Unexpected,
}

impl ErrorKind {
    /// Return the string representation of the `ErrorKind`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidConfig => "InvalidConfig",
            ErrorKind::MessageFormat => "MessageFormat",
            ErrorKind::Unserializable => "Unserializable",
            ErrorKind::Unexpected => "Unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error struct of jsonlogging.
pub struct Error {
    kind: ErrorKind,
    message: String,
    sources: Vec<anyhow::Error>,
    context: Vec<(&'static str, String)>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.sources.is_empty() {
            write!(f, ", sources: [")?;
            for (i, source) in self.sources.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{source}")?;
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("sources", &self.sources);
            return de.finish();
        }

        write!(f, "{} ({})", self.message, self.kind)?;
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "   {k}: {v}")?;
            }
        }
        if !self.sources.is_empty() {
            writeln!(f)?;
            writeln!(f, "Sources:")?;
            for source in self.sources.iter() {
                writeln!(f, "   {source:#}")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.sources.first().map(|v| v.as_ref())
    }
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sources: vec![],
            context: vec![],
        }
    }

    /// Add one more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Add one more source in error.
    pub fn with_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        self.sources.push(src.into());
        self
    }

    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return the message of this error, without context and sources.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Return an iterator over all sources of this error.
    pub fn sources(&self) -> impl ExactSizeIterator<Item = &(dyn std::error::Error + 'static)> {
        self.sources.iter().map(|v| v.as_ref())
    }

    /// Default constructor for [`Error`] from [`io::Error`].
    pub fn from_io_error(err: io::Error) -> Error {
        Error::new(ErrorKind::Unexpected, "failed to perform io").with_source(err)
    }

    /// Default constructor for [`Error`] from [`fmt::Error`].
    pub fn from_fmt_error(err: fmt::Error) -> Error {
        Error::new(ErrorKind::MessageFormat, "failed to perform format").with_source(err)
    }

    /// Default constructor for [`Error`] from a declarative configuration that serde rejected.
    pub fn from_config_error(what: &'static str, err: serde_json::Error) -> Error {
        Error::new(ErrorKind::InvalidConfig, format!("invalid {what}")).with_source(err)
    }
}
