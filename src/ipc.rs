// Copyright (c) 2019 Jason White
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

//! The wire protocol spoken between the engine and a data compiler process.
//!
//! Every message is a single line of JSON of the form `{"type": <int>,
//! "data": <object>}`, written to the worker's stdin and read back from its
//! stdout. A worker must answer exactly one `BuildResult` per `BuildRequest`,
//! in order. All paths on the wire are absolute; the engine relativizes them
//! before anything is persisted.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

const VERSION_QUERY: u8 = 0;
const VERSION_DATA: u8 = 1;
const BUILD_REQUEST: u8 = 2;
const BUILD_RESULT: u8 = 3;

/// The envelope as it appears on the wire.
#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: u8,
    data: Value,
}

/// The protocol version a worker implements. Cached per worker; a worker
/// that never answers is assumed to speak version 1.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub struct VersionData {
    pub version: u32,
}

/// A request to compile one source file into the given target location.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub platform: String,
}

/// A worker's answer to a `BuildRequest`.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub platform: String,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
    #[serde(default)]
    pub references: Vec<PathBuf>,
}

/// A single IPC message. The numeric tags are part of the wire contract and
/// must never be renumbered.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    VersionQuery,
    VersionData(VersionData),
    BuildRequest(BuildRequest),
    BuildResult(BuildResult),
}

impl Message {
    /// Parses one line of the wire format.
    pub fn from_line(line: &str) -> Result<Message, Error> {
        let envelope: Envelope = serde_json::from_str(line)?;

        let message = match envelope.kind {
            VERSION_QUERY => Message::VersionQuery,
            VERSION_DATA => {
                Message::VersionData(serde_json::from_value(envelope.data)?)
            }
            BUILD_REQUEST => {
                Message::BuildRequest(serde_json::from_value(envelope.data)?)
            }
            BUILD_RESULT => {
                Message::BuildResult(serde_json::from_value(envelope.data)?)
            }
            kind => {
                return Err(failure::format_err!(
                    "Unknown IPC message type {}",
                    kind
                ));
            }
        };

        Ok(message)
    }

    /// Writes the message as one line, followed by a flush so the peer sees
    /// it immediately.
    pub fn write_line<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let envelope = match self {
            Message::VersionQuery => Envelope {
                kind: VERSION_QUERY,
                data: Value::Object(Default::default()),
            },
            Message::VersionData(data) => Envelope {
                kind: VERSION_DATA,
                data: serde_json::to_value(data)
                    .map_err(io::Error::from)?,
            },
            Message::BuildRequest(data) => Envelope {
                kind: BUILD_REQUEST,
                data: serde_json::to_value(data)
                    .map_err(io::Error::from)?,
            },
            Message::BuildResult(data) => Envelope {
                kind: BUILD_RESULT,
                data: serde_json::to_value(data)
                    .map_err(io::Error::from)?,
            },
        };

        serde_json::to_writer(&mut *writer, &envelope)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Reads the next message from a buffered stream. `None` on EOF.
    pub fn read_from<R: BufRead>(
        reader: &mut R,
    ) -> Result<Option<Message>, Error> {
        let mut line = String::new();

        loop {
            line.clear();

            if reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }

            let trimmed = line.trim();

            // Workers are allowed to emit blank lines between messages.
            if !trimmed.is_empty() {
                return Ok(Some(Message::from_line(trimmed)?));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let messages = vec![
            Message::VersionQuery,
            Message::VersionData(VersionData { version: 2 }),
            Message::BuildRequest(BuildRequest {
                source_path: PathBuf::from("/p/packages/core.source/a.txt"),
                target_path: PathBuf::from("/p/packages/core.generic.target/1234abcd"),
                platform: "generic".to_string(),
            }),
            Message::BuildResult(BuildResult {
                source_path: PathBuf::from("/p/packages/core.source/a.txt"),
                target_path: PathBuf::from("/p/packages/core.generic.target/1234abcd"),
                platform: "generic".to_string(),
                success: true,
                errors: vec![],
                outputs: vec![PathBuf::from(
                    "/p/packages/core.generic.target/1234abcd.txt",
                )],
                references: vec![],
            }),
        ];

        for message in messages {
            let mut buf = Vec::new();
            message.write_line(&mut buf).unwrap();

            let line = String::from_utf8(buf).unwrap();
            assert_eq!(Message::from_line(line.trim()).unwrap(), message);
        }
    }

    #[test]
    fn wire_tags_are_stable() {
        let mut buf = Vec::new();
        Message::VersionQuery.write_line(&mut buf).unwrap();

        let value: Value =
            serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["type"], 0);

        let mut buf = Vec::new();
        Message::BuildResult(BuildResult {
            source_path: PathBuf::from("/a"),
            target_path: PathBuf::from("/b"),
            platform: "ps3".to_string(),
            success: false,
            errors: vec!["boom".to_string()],
            outputs: vec![],
            references: vec![],
        })
        .write_line(&mut buf)
        .unwrap();

        let value: Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["type"], 3);
        assert_eq!(value["data"]["success"], false);
        assert_eq!(value["data"]["errors"][0], "boom");
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(Message::from_line(r#"{"type": 9, "data": {}}"#).is_err());
    }

    #[test]
    fn missing_result_fields_default() {
        let line = r#"{"type": 3, "data": {"sourcePath": "/a",
            "targetPath": "/b", "platform": "generic", "success": true}}"#;

        match Message::from_line(line).unwrap() {
            Message::BuildResult(result) => {
                assert!(result.success);
                assert!(result.errors.is_empty());
                assert!(result.outputs.is_empty());
                assert!(result.references.is_empty());
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
