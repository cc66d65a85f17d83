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

//! The build of one package for one platform.
//!
//! The target builder owns the pure build logic: which files exist, which of
//! them participate on this platform, which need to be recompiled, and how a
//! compiler's results land in the databases. It never counts, never talks to
//! sinks, and never saves anything; the package builder layers all of that
//! on top.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;
use walkdir::WalkDir;

use crate::error::Error;
use crate::ipc::BuildResult;
use crate::manifest::{Manifest, ManifestResource};
use crate::pool::Job;
use crate::project::{Package, Project};
use crate::res::{self, SourceEntry, TargetEntry, GENERIC_PLATFORM};
use crate::util::PathExt;
use crate::view::{target_stem, TargetView};

const SKIP_WRONG_PLATFORM: &str = "does not match build target";
const SKIP_OVERRIDDEN: &str = "overridden by platform-specific version";
const SKIP_UP_TO_DATE: &str = "up-to-date";

/// A source file that survived enumeration and override resolution, not yet
/// checked against the databases.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub source_path: PathBuf,
    pub entry: SourceEntry,
}

/// A source file that was deliberately left out, and why.
#[derive(Clone, Debug)]
pub struct Skip {
    pub source_path: PathBuf,
    pub reason: String,
}

pub struct TargetBuilder<'a> {
    project: &'a Project,
    package: &'a Package,
    view: &'a mut TargetView,
}

impl<'a> TargetBuilder<'a> {
    pub fn new(
        project: &'a Project,
        package: &'a Package,
        view: &'a mut TargetView,
    ) -> TargetBuilder<'a> {
        TargetBuilder {
            project,
            package,
            view,
        }
    }

    /// Walks the package source tree and resolves platform overrides.
    ///
    /// A platform-specific file only participates when its platform is the
    /// build target, and then it shadows the generic file of the same
    /// resource name. Hidden files and directories are invisible.
    pub fn enumerate(&self) -> Result<(Vec<Candidate>, Vec<Skip>), Error> {
        let mut kept: Vec<Candidate> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut skips = Vec::new();

        let target_platform = self.view.platform().to_string();

        let walker = WalkDir::new(&self.package.source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e
                        .file_name()
                        .to_str()
                        .map(|s| s.starts_with('.'))
                        .unwrap_or(false)
            });

        for entry in walker {
            let entry = entry?;

            if !entry.file_type().is_file() {
                continue;
            }

            let candidate = Candidate {
                source_path: entry.path().to_path_buf(),
                entry: SourceEntry::from_file(
                    &self.package.source_dir,
                    entry.path(),
                    &self.project.platforms,
                )?,
            };

            let platform = candidate.entry.platform.clone();

            if platform != GENERIC_PLATFORM && platform != target_platform {
                skips.push(Skip {
                    source_path: candidate.source_path,
                    reason: SKIP_WRONG_PLATFORM.to_string(),
                });
                continue;
            }

            match by_name.get(&candidate.entry.resource_name).copied() {
                None => {
                    by_name.insert(
                        candidate.entry.resource_name.clone(),
                        kept.len(),
                    );
                    kept.push(candidate);
                }
                Some(i) => {
                    let held_is_generic =
                        kept[i].entry.platform == GENERIC_PLATFORM;

                    if platform == GENERIC_PLATFORM && !held_is_generic {
                        // The specific version got there first.
                        skips.push(Skip {
                            source_path: candidate.source_path,
                            reason: SKIP_OVERRIDDEN.to_string(),
                        });
                    } else {
                        // The newcomer wins: either it is the specific
                        // version shadowing the generic one, or a later
                        // entry for the same name.
                        skips.push(Skip {
                            source_path: kept[i].source_path.clone(),
                            reason: SKIP_OVERRIDDEN.to_string(),
                        });
                        kept[i] = candidate;
                    }
                }
            }
        }

        Ok((kept, skips))
    }

    /// Splits candidates into jobs that must run and up-to-date skips.
    pub fn decide(
        &self,
        candidates: Vec<Candidate>,
    ) -> (Vec<Job>, Vec<Skip>) {
        let mut jobs = Vec::new();
        let mut skips = Vec::new();

        for candidate in candidates {
            if self.needs_build(&candidate) {
                jobs.push(Job {
                    target_path: self
                        .view
                        .target_path_for(&candidate.entry.resource_name),
                    resource_name: candidate.entry.resource_name.clone(),
                    resource_type: candidate.entry.resource_type.clone(),
                    platform: self.view.platform().to_string(),
                    source_path: candidate.source_path,
                    source_entry: candidate.entry,
                });
            } else {
                skips.push(Skip {
                    source_path: candidate.source_path,
                    reason: SKIP_UP_TO_DATE.to_string(),
                });
            }
        }

        (jobs, skips)
    }

    fn needs_build(&self, candidate: &Candidate) -> bool {
        let stored =
            match self.view.source_db.get(&candidate.entry.relative_path) {
                Some(stored) => stored,
                None => return true,
            };

        if stored.write_time != candidate.entry.write_time
            || stored.file_size != candidate.entry.file_size
        {
            return true;
        }

        let mut visiting = HashSet::new();
        let mut done = HashSet::new();

        if stored
            .dependencies
            .iter()
            .any(|dep| self.dependency_dirty(dep, &mut visiting, &mut done))
        {
            return true;
        }

        self.outputs_missing(&candidate.entry)
    }

    /// Transitive dirtiness of one dependency. A dependency is dirty when it
    /// has no record, is gone from disk, changed size or mtime, or sits on a
    /// dependency cycle (which means the recorded graph cannot be trusted).
    fn dependency_dirty(
        &self,
        dep: &Path,
        visiting: &mut HashSet<PathBuf>,
        done: &mut HashSet<PathBuf>,
    ) -> bool {
        if done.contains(dep) {
            return false;
        }

        if !visiting.insert(dep.to_path_buf()) {
            return true;
        }

        let dirty = match self.view.source_db.get(dep) {
            None => true,
            Some(record) => {
                let path = self.package.source_dir.join(dep);

                match fs::metadata(&path) {
                    Err(_) => true,
                    Ok(metadata) => {
                        let write_time = metadata
                            .modified()
                            .ok()
                            .map(DateTime::<Utc>::from);

                        write_time != Some(record.write_time)
                            || metadata.len() != record.file_size
                            || record.dependencies.iter().any(|d| {
                                self.dependency_dirty(d, visiting, done)
                            })
                    }
                }
            }
        };

        visiting.remove(dep);

        if !dirty {
            done.insert(dep.to_path_buf());
        }

        dirty
    }

    /// True when the recorded outputs for this resource cannot be trusted:
    /// the resource was never built for this target, or an output file has
    /// gone missing.
    fn outputs_missing(&self, entry: &SourceEntry) -> bool {
        let stem = target_stem(&entry.resource_name);

        match self.view.target_db.get(Path::new(&stem)) {
            None => true,
            Some(target) => target
                .outputs
                .iter()
                .any(|output| !self.view.target_dir().join(output).exists()),
        }
    }

    /// Records a successful build result: the source record, a record per
    /// returned reference (with the back-reference), and the target record
    /// with its outputs. Returns the relative output paths.
    pub fn ingest(
        &mut self,
        job: &Job,
        compiler_name: &str,
        result: &BuildResult,
    ) -> Result<Vec<PathBuf>, Error> {
        let root = self.package.source_dir.clone();

        let mut source_entry = job.source_entry.clone();

        for reference in &result.references {
            source_entry.add_dependency(&root, reference);
        }

        let source_relative = source_entry.relative_path.clone();
        self.view.source_db.insert(source_entry);

        for reference in &result.references {
            let mut record = match SourceEntry::from_file(
                &root,
                reference,
                &self.project.platforms,
            ) {
                Ok(record) => record,
                Err(err) => {
                    warn!(
                        "ignoring unreadable reference {:?}: {}",
                        reference, err
                    );
                    continue;
                }
            };

            // A fresh stat, but the recorded relationships survive.
            if let Some(existing) =
                self.view.source_db.get(&record.relative_path)
            {
                record.references = existing.references.clone();
                record.dependencies = existing.dependencies.clone();
            }

            record.add_reference(&root, &job.source_path);
            self.view.source_db.insert(record);
        }

        let target_dir = self.view.target_dir().to_path_buf();

        let relative_path = job
            .target_path
            .relative_from(&target_dir)
            .unwrap_or_else(|| job.target_path.clone());

        let mut target_entry = TargetEntry {
            relative_path,
            source_path: source_relative,
            platform: self.view.platform().to_string(),
            compiler_name: compiler_name.to_string(),
            outputs: Vec::new(),
        };

        for output in &result.outputs {
            target_entry.add_output(&target_dir, output);
        }

        let outputs = target_entry.outputs.clone();
        self.view.target_db.insert(target_entry);

        Ok(outputs)
    }

    /// Writes the package manifest, unless this was a no-op run over an
    /// existing manifest. Keeping the old file keeps its build date, so
    /// rebuilding an unchanged package changes nothing on disk.
    pub fn write_manifest(&self, built: bool) -> Result<bool, Error> {
        let path = self.view.manifest_path();

        if path.exists() && !self.view.is_dirty() && !built {
            return Ok(false);
        }

        let mut resources = Vec::new();

        for target in self.view.target_db.iter() {
            let resource = match self.view.source_db.get(&target.source_path)
            {
                Some(source) => ManifestResource {
                    name: source.resource_name.clone(),
                    resource_type: source.resource_type.clone(),
                    tags: source.properties.clone(),
                    data: target.outputs.clone(),
                },
                None => {
                    // The source record is gone; reconstruct the naming
                    // parts from the recorded path.
                    let parsed = res::parse(
                        Path::new(""),
                        &target.source_path,
                    )?;

                    ManifestResource {
                        name: parsed.name,
                        resource_type: parsed.resource_type,
                        tags: parsed.properties,
                        data: target.outputs.clone(),
                    }
                }
            };

            resources.push(resource);
        }

        Manifest {
            project_name: self.project.name.clone(),
            package_name: self.view.package_name().to_string(),
            build_date: Utc::now(),
            platform: self.view.platform().to_string(),
            resources,
        }
        .save(&path)?;

        Ok(true)
    }
}
