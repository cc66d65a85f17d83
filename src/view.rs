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

//! One package built for one platform.
//!
//! The view owns the pair of databases for a `(package, platform)`
//! combination and knows where everything for that combination lives on
//! disk: the target directory and the two database files. The target builder
//! borrows the databases for the duration of a build; the package builder
//! saves them when the build is done.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::db::Database;
use crate::error::{Error, ResultExt};
use crate::project::{Package, Project};
use crate::res::{SourceEntry, TargetEntry, GENERIC_PLATFORM};

/// Computes the stable file stem for a resource name.
///
/// This is the legacy 32-bit rolling hash, `h = (h << 7) + (h >> 25) + c`
/// over the Unicode code points, carried out in signed 32-bit two's
/// complement with an arithmetic right shift. The sign of the final value is
/// preserved in the rendering, so renaming a resource and renaming it back
/// always lands on the same file, on every platform.
pub fn target_stem(resource_name: &str) -> String {
    let mut hash: i32 = 0;

    for c in resource_name.chars() {
        hash = hash
            .wrapping_shl(7)
            .wrapping_add(hash >> 25)
            .wrapping_add(c as i32);
    }

    if hash < 0 {
        format!("-{:x}", -(i64::from(hash)))
    } else {
        format!("{:x}", hash)
    }
}

/// The derived paths and databases for one `(package, platform)` pair.
pub struct TargetView {
    package_name: String,
    platform: String,
    target_dir: PathBuf,
    source_db_path: PathBuf,
    target_db_path: PathBuf,

    pub source_db: Database<SourceEntry>,
    pub target_db: Database<TargetEntry>,
}

impl TargetView {
    /// Opens the view for a package and platform, creating the target
    /// directory if needed and loading (or creating) both databases. An
    /// empty platform name means generic.
    pub fn open(
        project: &Project,
        package: &Package,
        platform: &str,
    ) -> Result<TargetView, Error> {
        let platform = if platform.is_empty() {
            GENERIC_PLATFORM
        } else {
            platform
        };

        let target_dir = package.packages_dir.join(format!(
            "{}.{}.target",
            package.name, platform
        ));

        fs::create_dir_all(&target_dir).with_context(|_| {
            format!("Failed to create target directory {:?}", target_dir)
        })?;

        let source_db_path = project.database_dir.join(format!(
            "{}.{}.source.json",
            package.name, platform
        ));
        let target_db_path = project.database_dir.join(format!(
            "{}.{}.target.json",
            package.name, platform
        ));

        let source_db = Database::open(
            &source_db_path,
            &package.name,
            None,
            &package.source_dir,
        )?;
        let target_db = Database::open(
            &target_db_path,
            &package.name,
            Some(platform),
            &target_dir,
        )?;

        debug!(
            "opened target view {}.{} ({} sources, {} targets)",
            package.name,
            platform,
            source_db.len(),
            target_db.len()
        );

        Ok(TargetView {
            package_name: package.name.clone(),
            platform: platform.to_string(),
            target_dir,
            source_db_path,
            target_db_path,
            source_db,
            target_db,
        })
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// The absolute path a resource's primary build output is grouped under.
    pub fn target_path_for(&self, resource_name: &str) -> PathBuf {
        self.target_dir.join(target_stem(resource_name))
    }

    /// The path of the package manifest for this view.
    pub fn manifest_path(&self) -> PathBuf {
        self.target_dir.join("package.manifest")
    }

    /// True if either database has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.source_db.is_dirty() || self.target_db.is_dirty()
    }

    /// Saves whichever databases are dirty. Returns true if anything was
    /// written.
    pub fn save(&mut self) -> Result<bool, Error> {
        let mut saved = false;

        if self.source_db.is_dirty() {
            self.source_db.save(&self.source_db_path)?;
            saved = true;
        }

        if self.target_db.is_dirty() {
            self.target_db.save(&self.target_db_path)?;
            saved = true;
        }

        Ok(saved)
    }
}
