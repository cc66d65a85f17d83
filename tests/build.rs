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

//! End-to-end builds against real worker processes.

mod common;

use std::fs;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use anvil::db::Database;
use anvil::res::{SourceEntry, TargetEntry};
use anvil::{BuildEvent, ProjectBuilder};

use common::TestProject;

fn ignore_reasons(events: &[BuildEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            BuildEvent::Ignore(i) => Some(i.reason.clone()),
            _ => None,
        })
        .collect()
}

fn success_names(events: &[BuildEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            BuildEvent::Success(s) => Some(s.name.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn platform_specific_version_overrides_generic() {
    let project = TestProject::new();

    project.platforms(&["ps3"]);
    project.pipeline(json!({
        "texture": { "path": common::worker_exe() }
    }));
    project.source("core", "tex/brick.texture", "generic brick");
    project.source("core", "tex/brick.ps3.texture", "ps3 brick");

    let mut builder = ProjectBuilder::open(project.root()).unwrap();
    let mut events: Vec<BuildEvent> = Vec::new();
    let summary = builder
        .build_package("core", "ps3", &mut events)
        .unwrap();
    builder.dispose().unwrap();

    assert!(summary.success);
    assert_eq!(summary.built, 1);
    assert!(ignore_reasons(&events)
        .iter()
        .any(|r| r == "overridden by platform-specific version"));

    let db: Database<SourceEntry> = Database::open(
        &project.database_path("core", "ps3", "source"),
        "core",
        None,
        project.root(),
    )
    .unwrap();

    let entry = db.get(Path::new("tex/brick.ps3.texture")).unwrap();
    assert_eq!(entry.resource_name, "tex/brick");
    assert_eq!(entry.platform, "ps3");
    assert!(db.get(Path::new("tex/brick.texture")).is_none());
}

#[test]
fn unknown_resource_type_is_skipped_not_failed() {
    let project = TestProject::new();

    project.source("core", "foo.unknown", "data");

    let mut builder = ProjectBuilder::open(project.root()).unwrap();
    let mut events: Vec<BuildEvent> = Vec::new();
    let summary = builder
        .build_package("core", "generic", &mut events)
        .unwrap();
    builder.dispose().unwrap();

    assert!(summary.success);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.built, 0);
    assert!(ignore_reasons(&events).iter().any(|r| {
        r.starts_with("No data compiler for resource type unknown")
    }));

    let db: Database<SourceEntry> = Database::open(
        &project.database_path("core", "generic", "source"),
        "core",
        None,
        project.root(),
    )
    .unwrap();
    assert!(db.is_empty());
}

#[test]
fn touched_dependency_invalidates_the_referer() {
    let project = TestProject::new();

    project.pipeline(json!({
        "txt": { "path": common::worker_exe() }
    }));
    project.source("core", "a.txt", "#include \"b.inc\"\npayload");
    let b_path = project.source("core", "b.inc", "one");

    let mut builder = ProjectBuilder::open(project.root()).unwrap();
    let mut events: Vec<BuildEvent> = Vec::new();
    let summary = builder
        .build_package("core", "generic", &mut events)
        .unwrap();
    builder.dispose().unwrap();

    assert!(summary.success);
    assert_eq!(success_names(&events), vec!["a"]);

    let db: Database<SourceEntry> = Database::open(
        &project.database_path("core", "generic", "source"),
        "core",
        None,
        project.root(),
    )
    .unwrap();

    let a = db.get(Path::new("a.txt")).unwrap();
    assert!(a.dependencies.contains(&"b.inc".into()));

    let b = db.get(Path::new("b.inc")).unwrap();
    assert!(b.references.contains(&"a.txt".into()));

    // Advance the dependency's mtime.
    sleep(Duration::from_millis(50));
    fs::write(&b_path, "two, longer").unwrap();

    let mut builder = ProjectBuilder::open(project.root()).unwrap();
    let mut events: Vec<BuildEvent> = Vec::new();
    let summary = builder
        .build_package("core", "generic", &mut events)
        .unwrap();
    builder.dispose().unwrap();

    assert!(summary.success);
    assert_eq!(success_names(&events), vec!["a"]);

    let db: Database<SourceEntry> = Database::open(
        &project.database_path("core", "generic", "source"),
        "core",
        None,
        project.root(),
    )
    .unwrap();

    let expected: DateTime<Utc> =
        fs::metadata(&b_path).unwrap().modified().unwrap().into();
    assert_eq!(db.get(Path::new("b.inc")).unwrap().write_time, expected);
}

#[test]
fn crashing_worker_is_restarted_and_the_build_succeeds() {
    let project = TestProject::new();

    let marker = project.root().join("crashed-once");

    project.pipeline(json!({
        "txt": {
            "path": common::worker_exe(),
            "arguments": ["--fail-once", marker.to_str().unwrap()],
            "maxRestartCount": 2
        }
    }));
    project.source("core", "a.txt", "hello");

    let mut builder = ProjectBuilder::open(project.root()).unwrap();
    let mut events: Vec<BuildEvent> = Vec::new();
    let summary = builder
        .build_package("core", "generic", &mut events)
        .unwrap();
    builder.dispose().unwrap();

    assert!(marker.exists());
    assert!(summary.success);
    assert_eq!(summary.built, 1);

    let db: Database<SourceEntry> = Database::open(
        &project.database_path("core", "generic", "source"),
        "core",
        None,
        project.root(),
    )
    .unwrap();
    assert!(db.get(Path::new("a.txt")).is_some());
}

#[test]
fn routes_sharing_an_executable_share_one_worker() {
    let project = TestProject::new();

    project.pipeline(json!({
        "png": { "path": common::worker_exe() },
        "jpg": { "path": common::worker_exe() },
        "gif": { "path": common::worker_exe() }
    }));

    let builder = ProjectBuilder::open(project.root()).unwrap();

    assert_eq!(builder.pool().worker_count(), 1);

    let png = builder.pool().find_compiler("png", "generic");
    assert!(png.is_some());
    assert_eq!(builder.pool().find_compiler("jpg", "generic"), png);
    assert_eq!(builder.pool().find_compiler("gif", "generic"), png);

    builder.dispose().unwrap();
}

#[test]
fn rebuild_without_changes_is_a_no_op() {
    let project = TestProject::new();

    project.pipeline(json!({
        "txt": { "path": common::worker_exe() }
    }));
    project.source("core", "a.txt", "alpha");
    project.source("core", "b.txt", "beta");

    let mut builder = ProjectBuilder::open(project.root()).unwrap();
    let mut events: Vec<BuildEvent> = Vec::new();
    let summary = builder
        .build_package("core", "generic", &mut events)
        .unwrap();
    builder.dispose().unwrap();

    assert!(summary.success);
    assert_eq!(summary.built, 2);

    let source_db_path = project.database_path("core", "generic", "source");
    let target_db_path = project.database_path("core", "generic", "target");
    let manifest_path = project.manifest_path("core", "generic");

    let source_bytes = fs::read(&source_db_path).unwrap();
    let target_bytes = fs::read(&target_db_path).unwrap();
    let manifest_bytes = fs::read(&manifest_path).unwrap();

    let mut builder = ProjectBuilder::open(project.root()).unwrap();
    let mut events: Vec<BuildEvent> = Vec::new();
    let summary = builder
        .build_package("core", "generic", &mut events)
        .unwrap();
    builder.dispose().unwrap();

    assert!(summary.success);
    assert_eq!(summary.built, 0);
    assert!(!events
        .iter()
        .any(|e| matches!(e, BuildEvent::Compile(_))));
    assert_eq!(
        ignore_reasons(&events),
        vec!["up-to-date".to_string(), "up-to-date".to_string()]
    );

    assert_eq!(fs::read(&source_db_path).unwrap(), source_bytes);
    assert_eq!(fs::read(&target_db_path).unwrap(), target_bytes);
    assert_eq!(fs::read(&manifest_path).unwrap(), manifest_bytes);
}

#[test]
fn completions_arrive_in_submission_order() {
    let project = TestProject::new();

    project.pipeline(json!({
        "txt": { "path": common::worker_exe() }
    }));
    project.source("core", "a.txt", "1");
    project.source("core", "b.txt", "2");
    project.source("core", "c.txt", "3");

    let mut builder = ProjectBuilder::open(project.root()).unwrap();
    let mut events: Vec<BuildEvent> = Vec::new();
    let summary = builder
        .build_package("core", "generic", &mut events)
        .unwrap();
    builder.dispose().unwrap();

    assert!(summary.success);
    assert_eq!(success_names(&events), vec!["a", "b", "c"]);
}

#[test]
fn worker_version_is_cached() {
    let project = TestProject::new();

    project.pipeline(json!({
        "txt": {
            "path": common::worker_exe(),
            "arguments": ["--version-value", "7"]
        }
    }));
    project.source("core", "a.txt", "hello");

    let mut builder = ProjectBuilder::open(project.root()).unwrap();
    let mut events: Vec<BuildEvent> = Vec::new();
    builder
        .build_package("core", "generic", &mut events)
        .unwrap();

    // The version answer precedes the first build result, so it has been
    // processed by the time the build is done.
    assert_eq!(builder.pool().compiler_version("txt", "generic"), Some(7));

    builder.dispose().unwrap();
}

#[test]
fn manifest_lists_built_resources() {
    let project = TestProject::new();

    project.platforms(&["ps3"]);
    project.pipeline(json!({
        "texture": { "path": common::worker_exe() }
    }));
    project.source("core", "tex/brick.ps3.texture", "bricks");

    let mut builder = ProjectBuilder::open(project.root()).unwrap();
    let mut events: Vec<BuildEvent> = Vec::new();
    builder.build_package("core", "ps3", &mut events).unwrap();
    builder.dispose().unwrap();

    let manifest =
        anvil::manifest::Manifest::from_path(&project.manifest_path(
            "core", "ps3",
        ))
        .unwrap();

    assert_eq!(manifest.package_name, "core");
    assert_eq!(manifest.platform, "ps3");
    assert_eq!(manifest.resources.len(), 1);
    assert_eq!(manifest.resources[0].name, "tex/brick");
    assert_eq!(manifest.resources[0].resource_type, "texture");
    assert_eq!(manifest.resources[0].tags, vec!["ps3".to_string()]);
    assert_eq!(manifest.resources[0].data.len(), 1);

    // The outputs named by the manifest exist under the target directory.
    let target_dir = project.target_dir("core", "ps3");
    for data in &manifest.resources[0].data {
        assert!(target_dir.join(data).is_file());
    }

    let db: Database<TargetEntry> = Database::open(
        &project.database_path("core", "ps3", "target"),
        "core",
        None,
        &target_dir,
    )
    .unwrap();
    assert_eq!(db.platform(), Some("ps3"));
    assert_eq!(db.len(), 1);
}
