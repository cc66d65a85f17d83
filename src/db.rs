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

//! Persisted sets of per-file records, keyed by relative path.
//!
//! A database is mutated only while a build is running and saved once at the
//! end if anything changed. The dirty flag makes no-op builds cheap: a build
//! that inserts nothing writes nothing, which in turn keeps database files
//! byte-stable across idempotent rebuilds.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{CorruptDatabase, Error, ResultExt};
use crate::res::{SourceEntry, TargetEntry};
use crate::util::PathExt;

/// A record stored in a database. The key is the path relative to the
/// database's resource root.
pub trait Entry: Serialize + DeserializeOwned + Clone {
    fn key(&self) -> &Path;
}

impl Entry for SourceEntry {
    fn key(&self) -> &Path {
        &self.relative_path
    }
}

impl Entry for TargetEntry {
    fn key(&self) -> &Path {
        &self.relative_path
    }
}

/// The on-disk form of a database.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document<E> {
    bundle_name: String,
    #[serde(default)]
    platform: Option<String>,
    entries: Vec<E>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRef<'a, E> {
    bundle_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<&'a str>,
    entries: &'a [E],
}

/// A persisted set of records plus a side index from primary key to list
/// position. The index is always in 1-to-1 correspondence with the list.
pub struct Database<E> {
    bundle_name: String,
    platform: Option<String>,

    /// Absolute directory that all record keys are relative to.
    resource_root: PathBuf,

    entries: Vec<E>,
    index: HashMap<PathBuf, usize>,
    dirty: bool,
}

impl<E: Entry> Database<E> {
    /// An empty database. Starts out dirty so that a database which never
    /// existed on disk is written out on the first save.
    pub fn new<P: Into<PathBuf>>(
        bundle_name: &str,
        platform: Option<&str>,
        resource_root: P,
    ) -> Database<E> {
        Database {
            bundle_name: bundle_name.to_string(),
            platform: platform.map(str::to_string),
            resource_root: resource_root.into(),
            entries: Vec::new(),
            index: HashMap::new(),
            dirty: true,
        }
    }

    /// Loads the database, or starts empty (and dirty) when the file does
    /// not exist yet. A file that exists but cannot be parsed is an error.
    pub fn open<P: Into<PathBuf>>(
        path: &Path,
        bundle_name: &str,
        platform: Option<&str>,
        resource_root: P,
    ) -> Result<Database<E>, Error> {
        let mut db = Database::new(bundle_name, platform, resource_root);

        match fs::File::open(path) {
            Ok(f) => db.load_from(io::BufReader::new(f), path)?,
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(Error::from(err)
                    .context(format!("Failed to open {:?}", path))
                    .into());
            }
        }

        Ok(db)
    }

    /// Replaces all state with the contents of a reader.
    fn load_from<R: io::Read>(
        &mut self,
        reader: R,
        path: &Path,
    ) -> Result<(), Error> {
        let document: Document<E> = serde_json::from_reader(reader)
            .map_err(|err| {
                Error::from(err).context(CorruptDatabase {
                    path: path.to_path_buf(),
                })
            })?;

        self.bundle_name = document.bundle_name;
        self.platform = document.platform;
        self.entries = document.entries;

        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key().to_path_buf(), i))
            .collect();

        self.dirty = false;

        Ok(())
    }

    /// Writes the database through a temporary file so a crash mid-write
    /// cannot leave a truncated document behind. Clears the dirty flag.
    pub fn save(&mut self, path: &Path) -> Result<(), Error> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut tempfile = NamedTempFile::new_in(dir)
            .with_context(|_| format!("Failed to save {:?}", path))?;

        serde_json::to_writer_pretty(
            io::BufWriter::new(&mut tempfile),
            &DocumentRef {
                bundle_name: &self.bundle_name,
                platform: self.platform.as_deref(),
                entries: &self.entries,
            },
        )
        .with_context(|_| format!("Failed to serialize {:?}", path))?;

        tempfile
            .persist(path)
            .with_context(|_| format!("Failed to persist {:?}", path))?;

        self.dirty = false;

        Ok(())
    }

    pub fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn resource_root(&self) -> &Path {
        &self.resource_root
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.iter()
    }

    /// Looks up a record by absolute path.
    pub fn query(&self, root: &Path, path: &Path) -> Option<&E> {
        let relative = path.relative_from(root)?;
        self.get(&relative)
    }

    /// Looks up a record by its relative key.
    pub fn get(&self, relative: &Path) -> Option<&E> {
        self.index.get(relative).map(|&i| &self.entries[i])
    }

    /// Inserts a record, replacing any record with the same key. Marks the
    /// database dirty.
    pub fn insert(&mut self, entry: E) {
        let key = entry.key().to_path_buf();

        match self.index.get(&key) {
            Some(&i) => self.entries[i] = entry,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
            }
        }

        self.dirty = true;
    }

    /// Removes the record for an absolute path, if present. Marks the
    /// database dirty when something was actually removed.
    pub fn remove(&mut self, root: &Path, path: &Path) -> Option<E> {
        let relative = path.relative_from(root)?;
        let position = self.index.remove(&relative)?;

        let removed = self.entries.remove(position);

        // Positions above the removal point all shifted down by one.
        for i in self.index.values_mut() {
            if *i > position {
                *i -= 1;
            }
        }

        self.dirty = true;

        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn entry(path: &str) -> SourceEntry {
        SourceEntry {
            relative_path: PathBuf::from(path),
            resource_name: path.trim_end_matches(".txt").to_string(),
            resource_type: "txt".to_string(),
            properties: Vec::new(),
            platform: "generic".to_string(),
            references: Vec::new(),
            dependencies: Vec::new(),
            write_time: Utc::now(),
            file_size: 42,
        }
    }

    #[test]
    fn dirty_on_insert_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.generic.source.json");

        let mut db: Database<SourceEntry> =
            Database::new("core", None, "/pkg");

        db.insert(entry("a.txt"));
        assert!(db.is_dirty());

        db.save(&path).unwrap();
        assert!(!db.is_dirty());

        db.remove(Path::new("/pkg"), Path::new("/pkg/a.txt"))
            .unwrap();
        assert!(db.is_dirty());
    }

    #[test]
    fn insert_overwrites_same_key() {
        let mut db: Database<SourceEntry> =
            Database::new("core", None, "/pkg");

        db.insert(entry("a.txt"));

        let mut updated = entry("a.txt");
        updated.file_size = 100;
        db.insert(updated);

        assert_eq!(db.len(), 1);
        assert_eq!(db.get(Path::new("a.txt")).unwrap().file_size, 100);
    }

    #[test]
    fn remove_keeps_index_consistent() {
        let mut db: Database<SourceEntry> =
            Database::new("core", None, "/pkg");

        db.insert(entry("a.txt"));
        db.insert(entry("b.txt"));
        db.insert(entry("c.txt"));

        db.remove(Path::new("/pkg"), Path::new("/pkg/a.txt"))
            .unwrap();

        assert_eq!(db.len(), 2);
        assert_eq!(
            db.get(Path::new("b.txt")).unwrap().relative_path,
            PathBuf::from("b.txt")
        );
        assert_eq!(
            db.get(Path::new("c.txt")).unwrap().relative_path,
            PathBuf::from("c.txt")
        );
    }

    #[test]
    fn round_trip_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.generic.source.json");

        let mut db: Database<SourceEntry> =
            Database::new("core", None, "/pkg");

        let mut a = entry("a.txt");
        a.dependencies.push(PathBuf::from("b.inc"));
        db.insert(a.clone());
        db.insert(entry("b.inc"));
        db.save(&path).unwrap();

        let loaded: Database<SourceEntry> =
            Database::open(&path, "core", None, "/pkg").unwrap();

        assert!(!loaded.is_dirty());
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(Path::new("a.txt")), Some(&a));
    }

    #[test]
    fn missing_file_starts_empty_and_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-saved.json");

        let db: Database<SourceEntry> =
            Database::open(&path, "core", None, "/pkg").unwrap();

        assert!(db.is_empty());
        assert!(db.is_dirty());
    }

    #[test]
    fn corrupt_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.json");
        fs::write(&path, "{ not json").unwrap();

        let result: Result<Database<SourceEntry>, _> =
            Database::open(&path, "core", None, "/pkg");

        assert!(result.is_err());
    }

    #[test]
    fn target_platform_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.ps3.target.json");

        let mut db: Database<TargetEntry> =
            Database::new("core", Some("ps3"), "/pkg/core.ps3.target");

        db.insert(TargetEntry {
            relative_path: PathBuf::from("1a2b3c4d"),
            source_path: PathBuf::from("tex/brick.ps3.texture"),
            platform: "ps3".to_string(),
            compiler_name: "texturec".to_string(),
            outputs: vec![PathBuf::from("1a2b3c4d.texture")],
        });
        db.save(&path).unwrap();

        let loaded: Database<TargetEntry> =
            Database::open(&path, "core", None, "/pkg/core.ps3.target")
                .unwrap();

        assert_eq!(loaded.platform(), Some("ps3"));
        assert_eq!(loaded.len(), 1);
    }
}
