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

//! Source resources and build targets as they are recorded in the databases.
//!
//! A resource is identified by decomposing its path relative to the package
//! source directory. For `tex/brick.hires.ps3.texture`:
//!
//!  * name:       `tex/brick`
//!  * properties: `["hires", "ps3"]`
//!  * type:       `texture`
//!
//! The split happens at the first and last `.` after the final directory
//! separator. A dot-free filename has an empty type and no properties.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ResultExt};
use crate::util::PathExt;

/// The platform name given to resources that carry no platform property.
pub const GENERIC_PLATFORM: &str = "generic";

/// The decomposition of a source path into its naming parts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedPath {
    /// Path relative to the package source directory.
    pub relative_path: PathBuf,

    /// Slash-joined path without any extensions.
    pub name: String,

    /// The dot-separated extensions between the name and the type.
    pub properties: Vec<String>,

    /// The final extension. Empty for dot-free filenames.
    pub resource_type: String,
}

/// Decomposes `path` against the package source directory `root`.
pub fn parse(root: &Path, path: &Path) -> Result<ParsedPath, Error> {
    let relative_path = path.relative_from(root).ok_or_else(|| {
        failure::format_err!(
            "Path {:?} does not live under package root {:?}",
            path,
            root
        )
    })?;

    let slashed = relative_path.to_slash();

    // Only dots after the last directory separator delimit extensions.
    let basename_at = slashed.rfind('/').map(|p| p + 1).unwrap_or(0);

    let (name, properties, resource_type) =
        match slashed[basename_at..].find('.') {
            Some(first) => {
                let p1 = basename_at + first;

                // There is at least one dot, so rfind always succeeds.
                let p2 = slashed.rfind('.').unwrap();

                let properties = if p1 < p2 {
                    slashed[p1 + 1..p2]
                        .split('.')
                        .map(str::to_string)
                        .collect()
                } else {
                    Vec::new()
                };

                (
                    slashed[..p1].to_string(),
                    properties,
                    slashed[p2 + 1..].to_string(),
                )
            }
            None => (slashed.clone(), Vec::new(), String::new()),
        };

    Ok(ParsedPath {
        relative_path,
        name,
        properties,
        resource_type,
    })
}

/// Picks the platform for a resource: the first property that names a
/// recognized platform wins, otherwise the resource is generic.
pub fn platform_of(properties: &[String], platforms: &[String]) -> String {
    properties
        .iter()
        .find(|p| platforms.iter().any(|known| known == *p))
        .cloned()
        .unwrap_or_else(|| GENERIC_PLATFORM.to_string())
}

/// One input file under a package, as recorded in the source database.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    /// Primary key: path relative to the package source directory.
    pub relative_path: PathBuf,

    pub resource_name: String,
    pub resource_type: String,

    #[serde(default)]
    pub properties: Vec<String>,

    pub platform: String,

    /// Relative paths of files that point *at* this file.
    #[serde(default)]
    pub references: Vec<PathBuf>,

    /// Relative paths this file depends on.
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,

    pub write_time: DateTime<Utc>,
    pub file_size: u64,
}

impl SourceEntry {
    /// Builds a fresh entry for a file on disk. References and dependencies
    /// start out empty; they are filled in when a build result is ingested.
    pub fn from_file(
        root: &Path,
        path: &Path,
        platforms: &[String],
    ) -> Result<SourceEntry, Error> {
        let parsed = parse(root, path)?;

        let metadata = fs::metadata(path)
            .with_context(|_| format!("Failed to stat {:?}", path))?;

        let write_time = DateTime::<Utc>::from(
            metadata
                .modified()
                .with_context(|_| format!("No mtime for {:?}", path))?,
        );

        Ok(SourceEntry {
            relative_path: parsed.relative_path,
            resource_name: parsed.name,
            resource_type: parsed.resource_type,
            platform: platform_of(&parsed.properties, platforms),
            properties: parsed.properties,
            references: Vec::new(),
            dependencies: Vec::new(),
            write_time,
            file_size: metadata.len(),
        })
    }

    /// Records that `path` points at this file. Returns false if the
    /// reference was already known.
    pub fn add_reference(&mut self, root: &Path, path: &Path) -> bool {
        Self::append_unique(&mut self.references, root, path)
    }

    /// Records that this file depends on `path`. Returns false if the
    /// dependency was already known.
    pub fn add_dependency(&mut self, root: &Path, path: &Path) -> bool {
        Self::append_unique(&mut self.dependencies, root, path)
    }

    fn append_unique(
        list: &mut Vec<PathBuf>,
        root: &Path,
        path: &Path,
    ) -> bool {
        let relative = match path.relative_from(root) {
            Some(p) => p,
            None => path.to_path_buf(),
        };

        if list.contains(&relative) {
            false
        } else {
            list.push(relative);
            true
        }
    }
}

/// One build output grouping, as recorded in the target database. All paths
/// are relative to the target directory.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetEntry {
    /// Primary key: the hashed stem.
    pub relative_path: PathBuf,

    /// The source's path relative to the package source directory.
    pub source_path: PathBuf,

    pub platform: String,
    pub compiler_name: String,

    /// Ordered output files; the first is conventionally the primary one.
    /// Duplicates are suppressed on insertion.
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
}

impl TargetEntry {
    /// Appends an output path, relativized against the target directory.
    /// Duplicates are silently dropped.
    pub fn add_output(&mut self, target_dir: &Path, path: &Path) {
        let relative = match path.relative_from(target_dir) {
            Some(p) => p,
            None => path.to_path_buf(),
        };

        if !self.outputs.contains(&relative) {
            self.outputs.push(relative);
        }
    }
}
