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

//! Format log records as JSON, embedded in a text template.
//!
//! # Overview
//!
//! A [`JsonFormatter`] turns each log record into one line of text. A
//! [`RecordAdapter`](adapter::RecordAdapter) maps the record to an ordered set of fields, a
//! [`JsonEncoder`](encoder::JsonEncoder) serializes them, and the JSON is substituted into the
//! `{json}` placeholder of a [`Template`](template::Template).
//!
//! Formatting never fails: message and serialization problems degrade the output and are reported
//! to a [`Trap`](trap::Trap) instead of reaching the code that logs.
//!
//! # Examples
//!
//! Format a record directly:
//!
//! ```
//! use jsonlogging::JsonFormatter;
//! use jsonlogging::record::Record;
//!
//! let formatter = JsonFormatter::default();
//! let record = Record::builder()
//!     .target("app")
//!     .message("{} users online")
//!     .arg(42)
//!     .build();
//!
//! let line = formatter.format(&record);
//! assert!(line.contains(r#""message":"42 users online""#));
//! ```
//!
//! Build formatters from declarative configuration:
//!
//! ```
//! use jsonlogging::config::FormatterRegistry;
//!
//! let formatter = FormatterRegistry::new()
//!     .build(&serde_json::json!({
//!         "()": "json",
//!         "format": "my-app: {json}",
//!         "json_encoder": {"indent": 2},
//!     }))
//!     .unwrap();
//! assert_eq!(formatter.format_str(), "my-app: {json}");
//! ```
//!
//! Write records from the [`log`] crate to standard error:
//!
//! ```
//! # #[cfg(feature = "bridge-log")]
//! # {
//! use jsonlogging::append;
//! use jsonlogging::bridge::log::JsonLogger;
//!
//! JsonLogger::new(append::Stderr::default()).apply();
//!
//! log::info!("This is an info message.");
//! # }
//! ```
//!
//! [`log`]: https://docs.rs/log/

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod adapter;
pub mod append;
pub mod config;
pub mod encoder;
pub mod kv;
pub mod record;
pub mod template;
pub mod trap;
pub mod values;

mod error;
mod formatter;
mod layout;

pub use self::append::Append;
pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::formatter::JsonFormatter;
pub use self::layout::Layout;
pub use self::trap::Trap;

/// Bridge with other logging frameworks.
pub mod bridge {
    /// Bridge with [`log`].
    ///
    /// [`log`]: https://docs.rs/log/
    #[cfg(feature = "bridge-log")]
    pub mod log;
}
