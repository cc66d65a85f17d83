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

//! The per-target `package.manifest`: what a runtime reads to find the
//! built artifacts of a package.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, ResultExt};

/// One built resource and where its data lives, relative to the target
/// directory.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct ManifestResource {
    pub name: String,

    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub data: Vec<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub project_name: String,
    pub package_name: String,
    pub build_date: DateTime<Utc>,
    pub platform: String,
    pub resources: Vec<ManifestResource>,
}

impl Manifest {
    pub fn from_path(path: &Path) -> Result<Manifest, Error> {
        let f = fs::File::open(path)
            .with_context(|_| format!("Failed to open {:?}", path))?;

        let manifest = serde_json::from_reader(io::BufReader::new(f))
            .with_context(|_| format!("Failed to parse {:?}", path))?;

        Ok(manifest)
    }

    /// Writes the manifest through a temporary file, like the databases.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut tempfile = NamedTempFile::new_in(dir)
            .with_context(|_| format!("Failed to save {:?}", path))?;

        serde_json::to_writer_pretty(
            io::BufWriter::new(&mut tempfile),
            self,
        )
        .with_context(|_| format!("Failed to serialize {:?}", path))?;

        tempfile
            .persist(path)
            .with_context(|_| format!("Failed to persist {:?}", path))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("package.manifest");

        let manifest = Manifest {
            project_name: "demo".to_string(),
            package_name: "core".to_string(),
            build_date: Utc::now(),
            platform: "ps3".to_string(),
            resources: vec![ManifestResource {
                name: "tex/brick".to_string(),
                resource_type: "texture".to_string(),
                tags: vec!["ps3".to_string()],
                data: vec![PathBuf::from("-487ce361.texture")],
            }],
        };

        manifest.save(&path).unwrap();
        assert_eq!(Manifest::from_path(&path).unwrap(), manifest);
    }

    #[test]
    fn field_names_match_the_runtime() {
        let manifest = Manifest {
            project_name: "demo".to_string(),
            package_name: "core".to_string(),
            build_date: Utc::now(),
            platform: "generic".to_string(),
            resources: vec![ManifestResource {
                name: "a".to_string(),
                resource_type: "txt".to_string(),
                tags: Vec::new(),
                data: Vec::new(),
            }],
        };

        let value = serde_json::to_value(&manifest).unwrap();

        assert!(value.get("projectName").is_some());
        assert!(value.get("packageName").is_some());
        assert!(value.get("buildDate").is_some());
        assert_eq!(value["resources"][0]["type"], "txt");
    }
}
