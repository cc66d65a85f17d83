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

//! The build itself does not handle any sort of display for the user.
//! Instead, it hands events to a sink for consumption by a user-facing
//! logging system. Sinks receive events strictly serially.

use std::path::PathBuf;

use derive_more::From;
use log::{error, info, warn};

/// A package build has started.
#[derive(Clone, Debug)]
pub struct StartEvent {
    pub package: String,
    pub platform: String,
}

/// A source file has been handed to a compiler.
#[derive(Clone, Debug)]
pub struct CompileEvent {
    pub name: String,
    pub source_path: PathBuf,
}

/// A compiler finished a source file successfully and its results have been
/// recorded.
#[derive(Clone, Debug)]
pub struct SuccessEvent {
    pub name: String,
    pub source_path: PathBuf,
    pub outputs: Vec<PathBuf>,
}

/// A source file was deliberately not built.
#[derive(Clone, Debug)]
pub struct IgnoreEvent {
    pub source_path: PathBuf,
    pub reason: String,
}

/// Something went wrong with one source file or with the build machinery.
#[derive(Clone, Debug)]
pub struct ErrorEvent {
    /// The file at fault, when the error is attributable to one.
    pub source_path: Option<PathBuf>,
    pub message: String,
}

/// A package build has finished. Always the last event of a build.
#[derive(Clone, Debug)]
pub struct FinishEvent {
    pub package: String,
    pub platform: String,
    pub success: bool,
    pub built: usize,
    pub errors: usize,
    pub skipped: usize,
}

/// A single build event.
#[derive(Clone, Debug, From)]
pub enum BuildEvent {
    Start(StartEvent),
    Compile(CompileEvent),
    Success(SuccessEvent),
    Ignore(IgnoreEvent),
    Error(ErrorEvent),
    Finish(FinishEvent),
}

/// Receives the event stream of a package build.
pub trait EventSink {
    fn event(&mut self, event: &BuildEvent);
}

/// Collects events for later inspection. Handy in tests.
impl EventSink for Vec<BuildEvent> {
    fn event(&mut self, event: &BuildEvent) {
        self.push(event.clone());
    }
}

/// Drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn event(&mut self, _event: &BuildEvent) {}
}

/// Renders events through the `log` crate.
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn event(&mut self, event: &BuildEvent) {
        match event {
            BuildEvent::Start(e) => {
                info!("building {}.{}", e.package, e.platform);
            }
            BuildEvent::Compile(e) => {
                info!("compiling {} ({:?})", e.name, e.source_path);
            }
            BuildEvent::Success(e) => {
                info!("built {} -> {} output(s)", e.name, e.outputs.len());
            }
            BuildEvent::Ignore(e) => {
                warn!("skipped {:?}: {}", e.source_path, e.reason);
            }
            BuildEvent::Error(e) => match &e.source_path {
                Some(path) => error!("{:?}: {}", path, e.message),
                None => error!("{}", e.message),
            },
            BuildEvent::Finish(e) => {
                info!(
                    "finished {}.{}: {} built, {} skipped, {} error(s)",
                    e.package, e.platform, e.built, e.skipped, e.errors
                );
            }
        }
    }
}
