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

//! The reference data compiler: copies the source file to the target stem.
//!
//! This is the seed processor for new projects and the worker the test
//! suite drives. It speaks the standard protocol on stdin/stdout and
//! reports one reference per `#include "<path>"` directive found at the top
//! of a text source, paths resolved against the source file's directory.
//!
//! Flags:
//!
//!  * `--fail-once <marker>`: exit nonzero on the first build request,
//!    leaving the marker file behind; subsequent runs build normally.
//!  * `--version-value <n>`: protocol version to report.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::exit;

use anvil::ipc::{BuildRequest, BuildResult, Message, VersionData};

struct Options {
    fail_once: Option<PathBuf>,
    version: u32,
}

fn parse_args() -> Options {
    let mut options = Options {
        fail_once: None,
        version: 1,
    };

    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fail-once" => {
                options.fail_once = args.next().map(PathBuf::from);
            }
            "--version-value" => {
                if let Some(value) =
                    args.next().and_then(|v| v.parse().ok())
                {
                    options.version = value;
                }
            }
            other => {
                eprintln!("anvil-worker: unknown argument {:?}", other);
                exit(2);
            }
        }
    }

    options
}

fn main() {
    let options = parse_args();

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();

    loop {
        let message = match Message::read_from(&mut reader) {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(err) => {
                eprintln!("anvil-worker: {}", err);
                continue;
            }
        };

        let reply = match message {
            Message::VersionQuery => Message::VersionData(VersionData {
                version: options.version,
            }),
            Message::BuildRequest(request) => {
                if let Some(marker) = &options.fail_once {
                    if !marker.exists() {
                        let _ = fs::write(marker, b"failed once");
                        exit(1);
                    }
                }

                Message::BuildResult(compile(&request))
            }
            _ => continue,
        };

        if reply.write_line(&mut stdout.lock()).is_err() {
            break;
        }
    }
}

fn compile(request: &BuildRequest) -> BuildResult {
    let output = match request.source_path.extension() {
        Some(ext) => request.target_path.with_extension(ext),
        None => request.target_path.clone(),
    };

    let mut result = BuildResult {
        source_path: request.source_path.clone(),
        target_path: request.target_path.clone(),
        platform: request.platform.clone(),
        success: false,
        errors: Vec::new(),
        outputs: Vec::new(),
        references: Vec::new(),
    };

    match fs::copy(&request.source_path, &output) {
        Ok(_) => {
            result.success = true;
            result.outputs.push(output);
            result.references = scan_references(&request.source_path);
        }
        Err(err) => {
            result.errors.push(format!(
                "failed to copy {:?} to {:?}: {}",
                request.source_path, output, err
            ));
        }
    }

    result
}

/// `#include "<path>"` directives at the top of a text source, resolved
/// against the source's directory. Binary or unreadable sources simply have
/// no references.
fn scan_references(source: &Path) -> Vec<PathBuf> {
    let contents = match fs::read_to_string(source) {
        Ok(contents) => contents,
        Err(_) => return Vec::new(),
    };

    let dir = match source.parent() {
        Some(dir) => dir,
        None => return Vec::new(),
    };

    contents
        .lines()
        .take_while(|line| line.starts_with("#include"))
        .filter_map(|line| {
            let quoted = line["#include".len()..].trim();
            let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
            Some(dir.join(inner))
        })
        .collect()
}
