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

//! An incremental content build pipeline for game assets.
//!
//! A project is a directory of packages, each a tree of source files. For
//! every source file the engine picks a data compiler (an external worker
//! process routed by resource type and platform), dispatches build requests
//! over IPC, records inputs, outputs, and dependencies in per-target
//! databases, and emits a manifest per package so a runtime can find the
//! built artifacts. Files whose recorded state still matches the world are
//! not rebuilt.

pub mod build;
pub mod db;
pub mod error;
pub mod events;
pub mod ipc;
pub mod manifest;
pub mod pool;
pub mod project;
pub mod res;
pub mod util;
pub mod view;

pub use crate::build::{BuildSummary, PackageBuilder, ProjectBuilder};
pub use crate::error::Error;
pub use crate::events::{BuildEvent, ConsoleSink, EventSink};
pub use crate::pool::CompilerPool;
pub use crate::project::{Package, Pipeline, Project};
pub use crate::view::TargetView;
