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

use crate::Error;
use crate::Layout;
use crate::adapter::DefaultRecordAdapter;
use crate::adapter::RecordAdapter;
use crate::encoder::JsonEncoder;
use crate::record::Record;
use crate::template::Template;
use crate::trap::DefaultTrap;
use crate::trap::Trap;

/// Formats log records as JSON embedded in a text template.
///
/// For each record, the adapter produces a field mapping, the encoder serializes it and the
/// template surrounds it:
///
/// ```text
/// my-app: {"timestamp":"2024-08-11T14:44:57.172051+00:00","level":"ERROR","logger":"rolling_file","message":"Hello error!","location":{"module":"rolling_file","file":"examples/rolling_file.rs","line":51}}
/// ```
///
/// [`format`](JsonFormatter::format) never fails. If the mapping cannot be serialized as is,
/// the error goes to the formatter's [`Trap`] and the mapping is serialized again with every
/// value that has no JSON form coerced into a string (see [`JsonEncoder::encode_map_lossy`]).
///
/// # Examples
///
/// ```
/// use jsonlogging::JsonFormatter;
/// use jsonlogging::adapter::DefaultRecordAdapter;
/// use jsonlogging::encoder::JsonEncoder;
/// use jsonlogging::record::Record;
///
/// let formatter = JsonFormatter::new(
///     "my-app: {json}".parse().unwrap(),
///     JsonEncoder::compact(),
///     DefaultRecordAdapter::default(),
/// );
///
/// let record = Record::builder().message("hello").build();
/// assert!(formatter.format(&record).starts_with(r#"my-app: {"timestamp":"#));
/// ```
#[derive(Debug)]
pub struct JsonFormatter {
    template: Template,
    encoder: JsonEncoder,
    adapter: Box<dyn RecordAdapter>,
    trap: Box<dyn Trap>,
}

/// A formatter with the `{json}` template, the compact encoder and the default adapter.
impl Default for JsonFormatter {
    fn default() -> Self {
        JsonFormatter::new(
            Template::default(),
            JsonEncoder::compact(),
            DefaultRecordAdapter::default(),
        )
    }
}

impl JsonFormatter {
    /// Create a formatter.
    pub fn new(
        template: Template,
        encoder: JsonEncoder,
        adapter: impl Into<Box<dyn RecordAdapter>>,
    ) -> Self {
        JsonFormatter {
            template,
            encoder,
            adapter: adapter.into(),
            trap: Box::new(DefaultTrap::default()),
        }
    }

    /// Set the trap receiving the errors that [`format`](JsonFormatter::format) absorbs.
    ///
    /// Default to [`DefaultTrap`].
    pub fn with_trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    /// The template.
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// The template as configured, e.g. `"my-app: {json}"`.
    pub fn format_str(&self) -> &str {
        self.template.as_str()
    }

    /// The encoder.
    pub fn encoder(&self) -> &JsonEncoder {
        &self.encoder
    }

    /// The record adapter.
    pub fn adapter(&self) -> &dyn RecordAdapter {
        &*self.adapter
    }

    /// Format a record.
    pub fn format(&self, record: &Record) -> String {
        let map = self.adapter.adapt(record);
        let json = match self.encoder.encode_map(&map) {
            Ok(json) => json,
            Err(err) => {
                self.trap.trap(&err);
                match self.encoder.encode_map_lossy(&map) {
                    Ok(json) => json,
                    Err(err) => {
                        // lossy encoding only fails on a broken writer
                        self.trap.trap(&err);
                        "{}".to_string()
                    }
                }
            }
        };
        self.template.render(&json)
    }

    /// Format a record, returning serialization errors instead of degrading the output.
    ///
    /// # Errors
    ///
    /// Return an error of kind [`ErrorKind::Unserializable`](crate::ErrorKind::Unserializable)
    /// if the field mapping has a value without a JSON form.
    pub fn try_format(&self, record: &Record) -> Result<String, Error> {
        let map = self.adapter.adapt(record);
        let json = self.encoder.encode_map(&map)?;
        Ok(self.template.render(&json))
    }
}

impl Layout for JsonFormatter {
    fn format(&self, record: &Record) -> Result<Vec<u8>, Error> {
        Ok(JsonFormatter::format(self, record).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;
    use std::time::SystemTime;

    use super::*;
    use crate::ErrorKind;
    use crate::adapter::FieldMap;
    use crate::kv::Value;
    use crate::record::Level;

    #[derive(Debug, Default, Clone)]
    struct CollectingTrap(Arc<Mutex<Vec<String>>>);

    impl Trap for CollectingTrap {
        fn trap(&self, err: &Error) {
            self.0.lock().unwrap().push(err.to_string());
        }
    }

    #[derive(Debug)]
    struct Socket {
        fd: i32,
    }

    fn record() -> Record<'static> {
        Record::builder()
            .time(SystemTime::UNIX_EPOCH + Duration::from_micros(1372241168878024))
            .level(Level::Info)
            .target("app")
            .module_path(Some("app::http"))
            .file(Some("src/http.rs"))
            .line(Some(12))
            .message("hello {}")
            .arg("world")
            .key_value("status", 200)
            .build()
    }

    fn parse(json: &str) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::from_str(json).unwrap() {
            serde_json::Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn test_default_formatter_output() {
        let formatter = JsonFormatter::default();
        assert_eq!(formatter.format_str(), "{json}");
        insta::assert_snapshot!(
            formatter.format(&record()),
            @r#"{"timestamp":"2013-06-26T10:06:08.878024+00:00","level":"INFO","logger":"app","message":"hello world","location":{"module":"app::http","file":"src/http.rs","line":12},"status":200}"#
        );
    }

    #[test]
    fn test_template_wraps_json() {
        let formatter = JsonFormatter::new(
            "test: {json} [end]".parse().unwrap(),
            JsonEncoder::default(),
            DefaultRecordAdapter::default(),
        );
        let record = Record::builder().message("hello").build();

        let line = formatter.format(&record);
        assert!(line.starts_with("test: {"), "{line}");
        assert!(line.ends_with("} [end]"), "{line}");
        assert!(line.contains(r#""message": "hello""#), "{line}");

        let json = &line["test: ".len()..line.len() - " [end]".len()];
        let map = parse(json);
        for key in ["timestamp", "level", "logger", "message"] {
            assert!(map.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_format_is_idempotent() {
        let formatter = JsonFormatter::default();
        let record = record();
        assert_eq!(formatter.format(&record), formatter.format(&record));
    }

    #[test]
    fn test_format_delegates_to_adapter_and_encoder() {
        #[derive(Debug)]
        struct Fixed;

        impl RecordAdapter for Fixed {
            fn adapt(&self, _: &Record) -> FieldMap {
                FieldMap::from_iter([("this_is", "json")])
            }
        }

        let formatter = JsonFormatter::new(
            "Before {json} After".parse().unwrap(),
            JsonEncoder::compact(),
            Fixed,
        );
        assert_eq!(
            formatter.format(&record()),
            r#"Before {"this_is":"json"} After"#
        );
    }

    #[test]
    fn test_unserializable_extra_degrades() {
        let trap = CollectingTrap::default();
        let formatter = JsonFormatter::default().with_trap(trap.clone());
        let record = record()
            .to_builder()
            .key_value("socket", Value::opaque(Socket { fd: 3 }))
            .build();

        let line = formatter.format(&record);
        let map = parse(&line);
        assert_eq!(map["socket"], "Socket { fd: 3 }");
        assert_eq!(map["message"], "hello world");

        let trapped = trap.0.lock().unwrap();
        assert_eq!(trapped.len(), 1);
        assert!(trapped[0].starts_with("object is not JSON serializable"));

        let err = formatter.try_format(&record).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unserializable);
    }

    #[test]
    fn test_default_hook_serializes_extra() {
        let trap = CollectingTrap::default();
        let encoder = JsonEncoder::compact().with_default(|o| match o.downcast_ref::<Socket>() {
            Some(socket) => Ok(serde_json::json!({ "fd": socket.fd })),
            None => Err(Error::new(ErrorKind::Unserializable, "unknown object")),
        });
        let formatter =
            JsonFormatter::new(Template::default(), encoder, DefaultRecordAdapter::default())
                .with_trap(trap.clone());
        let record = record()
            .to_builder()
            .key_value("socket", Value::opaque(Socket { fd: 3 }))
            .build();

        let map = parse(&formatter.format(&record));
        assert_eq!(map["socket"], serde_json::json!({ "fd": 3 }));
        assert!(trap.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_message_mismatch_does_not_fail() {
        let trap = CollectingTrap::default();
        let formatter = JsonFormatter::default().with_trap(trap.clone());
        let record = record().to_builder().message("{} {}").args([1]).build();

        let map = parse(&formatter.format(&record));
        assert_eq!(map["message"], "{} {}");
        assert!(
            map["message_error"]
                .as_str()
                .unwrap()
                .starts_with("not enough arguments for message")
        );
        assert!(trap.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_far_future_record_keeps_timestamp() {
        let far = SystemTime::UNIX_EPOCH + Duration::from_secs(400_000 * 366 * 86_400);
        let record = record().to_builder().time(far).build();

        let map = parse(&JsonFormatter::default().format(&record));
        let timestamp = map["timestamp"].as_str().unwrap();
        assert!(timestamp.starts_with("9999-12-"), "{timestamp}");
        assert_eq!(map["message"], "hello world");
    }

    #[test]
    fn test_layout_bytes_match_format() {
        let formatter = JsonFormatter::default();
        let bytes = Layout::format(&formatter, &record()).unwrap();
        assert_eq!(bytes, formatter.format(&record()).into_bytes());
    }

    #[test]
    fn test_formatter_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<JsonFormatter>();
    }
}
