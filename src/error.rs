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

use std::path::PathBuf;

use failure_derive::Fail;

pub use failure::{Error, ResultExt};

/// A database file exists on disk but could not be parsed. Unlike a missing
/// file, this is fatal for the build: silently starting over from an empty
/// database would discard the dependency history.
#[derive(Fail, Debug)]
#[fail(display = "Corrupt database {:?}", path)]
pub struct CorruptDatabase {
    pub path: PathBuf,
}

/// A package named on the command line (or by a caller) does not exist under
/// the project's `packages` directory.
#[derive(Fail, Debug)]
#[fail(display = "No such package {:?}", name)]
pub struct NoSuchPackage {
    pub name: String,
}
