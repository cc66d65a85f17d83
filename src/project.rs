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

//! The on-disk project layout.
//!
//! ```text
//! <project>/
//!   database/      per-(package, platform) source and target databases
//!   packages/      <package>.source/ trees and <package>.<platform>.target/
//!   processors/    data compiler executables
//!   pipeline.json  route -> launch spec
//!   platform.json  recognized platform names
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ResultExt};
use crate::res::GENERIC_PLATFORM;

/// How to launch one data compiler process. Deserialized from
/// `pipeline.json`, keyed by route.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpec {
    /// Executable path, resolved under `processors/` unless absolute.
    pub path: PathBuf,

    #[serde(default)]
    pub arguments: Vec<String>,

    /// Working directory for the worker. Defaults to the project root.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    /// Environment variables added on top of the parent environment.
    #[serde(default)]
    pub extra_environment: BTreeMap<String, String>,

    /// Parent environment variables hidden from the worker.
    #[serde(default)]
    pub hide_environment: Vec<String>,

    /// How many times a crashed worker is restarted before its exit is
    /// terminal. Zero means no cap.
    #[serde(default = "default_max_restart_count")]
    pub max_restart_count: u32,

    /// Discard the worker's stderr instead of inheriting the engine's.
    #[serde(default)]
    pub suppress_stdio: bool,
}

fn default_max_restart_count() -> u32 {
    3
}

/// The route table: `"<type>"` or `"<type>.<platform>"` to launch spec.
/// A `BTreeMap` keeps worker startup order deterministic.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Pipeline(pub BTreeMap<String, LaunchSpec>);

impl Pipeline {
    pub fn from_path(path: &Path) -> Result<Pipeline, Error> {
        let f = fs::File::open(path)
            .with_context(|_| format!("Failed to open {:?}", path))?;

        let pipeline = serde_json::from_reader(io::BufReader::new(f))
            .with_context(|_| format!("Failed to parse {:?}", path))?;

        Ok(pipeline)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&String, &LaunchSpec)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A directory of source files that build together and ship together.
#[derive(Clone, Debug)]
pub struct Package {
    pub name: String,

    /// The project's `packages/` directory, which holds both this package's
    /// source tree and its target directories.
    pub packages_dir: PathBuf,

    /// `<packages_dir>/<name>.source`
    pub source_dir: PathBuf,
}

impl Package {
    /// Binds a package inside the packages directory, creating its
    /// `.source/` tree if this is a brand new package.
    pub fn new(packages_dir: &Path, name: &str) -> Result<Package, Error> {
        let source_dir = packages_dir.join(format!("{}.source", name));

        fs::create_dir_all(&source_dir).with_context(|_| {
            format!("Failed to create source directory {:?}", source_dir)
        })?;

        Ok(Package {
            name: name.to_string(),
            packages_dir: packages_dir.to_path_buf(),
            source_dir,
        })
    }

    /// The platform targets this package has been built for, found by
    /// scanning for `<name>.target` and `<name>.<platform>.target`
    /// directories. A bare `<name>.target` is the generic target.
    pub fn targets(&self) -> Result<Vec<String>, Error> {
        let mut targets = Vec::new();

        for entry in fs::read_dir(&self.packages_dir)? {
            let entry = entry?;

            if !entry.file_type()?.is_dir() {
                continue;
            }

            let file_name = entry.file_name();
            let stem = match file_name.to_str() {
                Some(s) if s.ends_with(".target") => {
                    &s[..s.len() - ".target".len()]
                }
                _ => continue,
            };

            if stem == self.name {
                targets.push(GENERIC_PLATFORM.to_string());
            } else if let Some(platform) = stem
                .strip_prefix(&self.name)
                .and_then(|rest| rest.strip_prefix('.'))
            {
                if !platform.is_empty() && !platform.contains('.') {
                    targets.push(platform.to_string());
                }
            }
        }

        targets.sort();

        Ok(targets)
    }
}

/// A project: the root directory plus everything found inside it.
#[derive(Debug)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
    pub packages_dir: PathBuf,
    pub database_dir: PathBuf,
    pub processors_dir: PathBuf,
    pub pipeline: Pipeline,
    pub platforms: Vec<String>,
    pub packages: BTreeMap<String, Package>,
}

impl Project {
    /// Opens a project, scaffolding the standard directories and scanning
    /// `packages/` for `*.source` trees.
    pub fn open(root: &Path) -> Result<Project, Error> {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());

        let packages_dir = root.join("packages");
        let database_dir = root.join("database");
        let processors_dir = root.join("processors");

        for dir in &[&packages_dir, &database_dir, &processors_dir] {
            fs::create_dir_all(dir).with_context(|_| {
                format!("Failed to create project directory {:?}", dir)
            })?;
        }

        let pipeline_path = root.join("pipeline.json");
        let pipeline = if pipeline_path.exists() {
            Pipeline::from_path(&pipeline_path)?
        } else {
            Pipeline::default()
        };

        let platforms = Self::load_platforms(&root.join("platform.json"))?;

        let mut packages = BTreeMap::new();

        for entry in fs::read_dir(&packages_dir)? {
            let entry = entry?;

            if !entry.file_type()?.is_dir() {
                continue;
            }

            let file_name = entry.file_name();
            if let Some(stem) = file_name
                .to_str()
                .and_then(|s| s.strip_suffix(".source"))
            {
                packages.insert(
                    stem.to_string(),
                    Package::new(&packages_dir, stem)?,
                );
            }
        }

        debug!(
            "opened project {:?}: {} package(s), {} route(s), {} platform(s)",
            name,
            packages.len(),
            pipeline.0.len(),
            platforms.len()
        );

        Ok(Project {
            name,
            root: root.to_path_buf(),
            packages_dir,
            database_dir,
            processors_dir,
            pipeline,
            platforms,
            packages,
        })
    }

    fn load_platforms(path: &Path) -> Result<Vec<String>, Error> {
        match fs::File::open(path) {
            Ok(f) => {
                let platforms: Vec<String> =
                    serde_json::from_reader(io::BufReader::new(f))
                        .with_context(|_| {
                            format!("Failed to parse {:?}", path)
                        })?;
                Ok(platforms)
            }
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => {
                Ok(Vec::new())
            }
            Err(err) => Err(Error::from(err)
                .context(format!("Failed to open {:?}", path))
                .into()),
        }
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// Resolves a pipeline executable path under `processors/`.
    pub fn resolve_processor(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.processors_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_defaults() {
        let json = r#"{
            "texture": {
                "path": "texturec",
                "arguments": ["--fast"]
            }
        }"#;

        let pipeline: Pipeline = serde_json::from_str(json).unwrap();
        let spec = &pipeline.0["texture"];

        assert_eq!(spec.path, PathBuf::from("texturec"));
        assert_eq!(spec.arguments, vec!["--fast".to_string()]);
        assert_eq!(spec.working_directory, None);
        assert!(spec.extra_environment.is_empty());
        assert!(spec.hide_environment.is_empty());
        assert_eq!(spec.max_restart_count, 3);
        assert!(!spec.suppress_stdio);
    }

    #[test]
    fn scans_source_packages() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("packages/core.source")).unwrap();
        fs::create_dir_all(root.join("packages/menu.source")).unwrap();
        fs::create_dir_all(root.join("packages/not-a-package")).unwrap();

        let project = Project::open(root).unwrap();

        assert_eq!(
            project.packages.keys().collect::<Vec<_>>(),
            vec!["core", "menu"]
        );
    }

    #[test]
    fn enumerates_platform_targets() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("packages/core.source")).unwrap();
        fs::create_dir_all(root.join("packages/core.target")).unwrap();
        fs::create_dir_all(root.join("packages/core.ps3.target")).unwrap();

        // Belongs to a different package; must not show up.
        fs::create_dir_all(root.join("packages/corena.ps3.target"))
            .unwrap();

        let project = Project::open(root).unwrap();
        let targets = project.packages["core"].targets().unwrap();

        assert_eq!(targets, vec!["generic", "ps3"]);
    }
}
