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
use std::io::Write;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::Error;
use crate::JsonFormatter;
use crate::Layout;
use crate::append::Append;
use crate::record::Record;

/// An appender that writes log records to any [`Write`] target, one per line.
///
/// # Examples
///
/// ```
/// use jsonlogging::append::Append;
/// use jsonlogging::append::Writer;
/// use jsonlogging::record::Record;
///
/// let appender = Writer::new(Vec::new());
/// appender.append(&Record::builder().message("hello").build()).unwrap();
///
/// let bytes = appender.into_inner();
/// assert!(bytes.ends_with(b"}\n"));
/// ```
#[derive(Debug)]
pub struct Writer<W> {
    writer: Mutex<W>,
    layout: Box<dyn Layout>,
}

impl<W: Write + Send + 'static> Writer<W> {
    /// Create a new [`Writer`] appender with [`JsonFormatter::default`] as its layout.
    pub fn new(writer: W) -> Self {
        Writer {
            writer: Mutex::new(writer),
            layout: Box::new(JsonFormatter::default()),
        }
    }

    /// Set the layout for the [`Writer`] appender.
    pub fn with_layout(mut self, layout: impl Into<Box<dyn Layout>>) -> Self {
        self.layout = layout.into();
        self
    }

    /// Consume the appender, returning the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn writer(&self) -> MutexGuard<'_, W> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send + fmt::Debug + 'static> Append for Writer<W> {
    fn append(&self, record: &Record) -> Result<(), Error> {
        let mut bytes = self.layout.format(record)?;
        bytes.push(b'\n');
        let mut writer = self.writer();
        writer.write_all(&bytes).map_err(Error::from_io_error)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), Error> {
        let mut writer = self.writer();
        writer.flush().map_err(Error::from_io_error)?;
        Ok(())
    }
}
