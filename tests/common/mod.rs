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

//! Scaffolding for integration tests: a throwaway project directory driven
//! by the reference worker binary.

use std::fs;
use std::path::{Path, PathBuf};

/// The reference worker compiled alongside the test suite.
pub fn worker_exe() -> String {
    env!("CARGO_BIN_EXE_anvil-worker").to_string()
}

pub struct TestProject {
    dir: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> TestProject {
        let _ = pretty_env_logger::try_init();

        TestProject {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn pipeline(&self, value: serde_json::Value) {
        fs::write(
            self.root().join("pipeline.json"),
            serde_json::to_vec_pretty(&value).unwrap(),
        )
        .unwrap();
    }

    pub fn platforms(&self, names: &[&str]) {
        fs::write(
            self.root().join("platform.json"),
            serde_json::to_vec(&names).unwrap(),
        )
        .unwrap();
    }

    /// Writes one source file under `packages/<package>.source/`.
    pub fn source(
        &self,
        package: &str,
        relative: &str,
        contents: &str,
    ) -> PathBuf {
        let path = self
            .root()
            .join("packages")
            .join(format!("{}.source", package))
            .join(relative);

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();

        path
    }

    pub fn database_path(
        &self,
        package: &str,
        platform: &str,
        kind: &str,
    ) -> PathBuf {
        self.root().join("database").join(format!(
            "{}.{}.{}.json",
            package, platform, kind
        ))
    }

    pub fn target_dir(&self, package: &str, platform: &str) -> PathBuf {
        self.root()
            .join("packages")
            .join(format!("{}.{}.target", package, platform))
    }

    pub fn manifest_path(&self, package: &str, platform: &str) -> PathBuf {
        self.target_dir(package, platform).join("package.manifest")
    }
}
