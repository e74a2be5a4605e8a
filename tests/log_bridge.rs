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

use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use jsonlogging::JsonFormatter;
use jsonlogging::adapter::DefaultRecordAdapter;
use jsonlogging::append;
use jsonlogging::bridge::log::JsonLogger;
use jsonlogging::encoder::JsonEncoder;

#[derive(Debug, Default, Clone)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn parse(line: &str) -> serde_json::Value {
    let json = line
        .strip_prefix("app: ")
        .unwrap_or_else(|| panic!("missing prefix: {line}"));
    serde_json::from_str(json).unwrap()
}

// the log crate allows one global logger per process, so the whole flow lives in one test
#[test]
fn test_log_macros_write_json_lines() {
    let buf = SharedBuf::default();
    let formatter = JsonFormatter::new(
        "app: {json}".parse().unwrap(),
        JsonEncoder::compact(),
        DefaultRecordAdapter::default(),
    );
    JsonLogger::new(append::Writer::new(buf.clone()).with_layout(formatter))
        .append(append::Testing::default())
        .with_level(log::LevelFilter::Info)
        .apply();

    log::error!(status = 500, path = "/login"; "request {} failed", 42);
    log::debug!("not written");

    let lines = buf.lines();
    assert_eq!(lines.len(), 1, "{lines:?}");

    let json = parse(&lines[0]);
    assert_eq!(json["level"], "ERROR");
    assert_eq!(json["logger"], "log_bridge");
    assert_eq!(json["message"], "request 42 failed");
    assert_eq!(json["location"]["module"], "log_bridge");
    assert_eq!(json["location"]["file"], "tests/log_bridge.rs");
    assert_eq!(json["status"], 500);
    assert_eq!(json["path"], "/login");

    let keys = json
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>();
    assert_eq!(
        keys,
        [
            "timestamp",
            "level",
            "logger",
            "message",
            "location",
            "status",
            "path"
        ]
    );

    // logging while the message is being formatted must not deadlock
    struct Thing<'a>(&'a str);

    impl std::fmt::Display for Thing<'_> {
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            log::warn!("formatting wrapping ({})", self.0);
            f.write_str(self.0)
        }
    }

    log::info!("I'm logging {}!", Thing("aha"));

    let lines = buf.lines();
    assert_eq!(lines.len(), 3, "{lines:?}");
    assert_eq!(parse(&lines[1])["message"], "formatting wrapping (aha)");
    assert_eq!(parse(&lines[2])["message"], "I'm logging aha!");
}
