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

//! Write formatted log records to their destinations.

use std::fmt;

use crate::Error;
use crate::record::Record;

mod stdio;
mod testing;
mod writer;

pub use self::stdio::Stderr;
pub use self::stdio::Stdout;
pub use self::testing::Testing;
pub use self::writer::Writer;

/// An appender that formats log records and writes them to a destination.
pub trait Append: fmt::Debug + Send + Sync + 'static {
    /// Format a log record and write it.
    fn append(&self, record: &Record) -> Result<(), Error>;

    /// Flush any buffered records.
    ///
    /// Default to a no-op.
    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

impl<T: Append> From<T> for Box<dyn Append> {
    fn from(value: T) -> Self {
        Box::new(value)
    }
}
