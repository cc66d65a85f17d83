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

//! The top of the stack: a project with a running compiler pool.

use std::path::Path;

use log::{debug, info};

use crate::build::package::{BuildSummary, PackageBuilder};
use crate::error::{Error, NoSuchPackage};
use crate::events::EventSink;
use crate::pool::{CompilerPool, PoolEvent};
use crate::project::Project;
use crate::view::TargetView;

pub struct ProjectBuilder {
    project: Project,
    pool: CompilerPool,
}

impl ProjectBuilder {
    /// Opens the project and brings up one worker per pipeline launch
    /// identity. Does not return until every worker has started; a worker
    /// that cannot be spawned fails the whole startup.
    pub fn open(root: &Path) -> Result<ProjectBuilder, Error> {
        let project = Project::open(root)?;

        let mut pool = CompilerPool::new();
        pool.startup(
            &project.processors_dir,
            &project.root,
            &project.pipeline,
        );

        loop {
            match pool.poll()? {
                PoolEvent::Ready => break,
                PoolEvent::Error { message, .. } => {
                    return Err(failure::format_err!(
                        "Compiler pool failed to start: {}",
                        message
                    ));
                }
                event => {
                    debug!("ignoring {:?} during startup", event);
                }
            }
        }

        info!("project {:?} ready", project.name);

        Ok(ProjectBuilder { project, pool })
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn pool(&self) -> &CompilerPool {
        &self.pool
    }

    /// Builds one package for one platform, reporting through the sink.
    pub fn build_package(
        &mut self,
        name: &str,
        platform: &str,
        sink: &mut dyn EventSink,
    ) -> Result<BuildSummary, Error> {
        let package = self.project.packages.get(name).ok_or_else(|| {
            Error::from(NoSuchPackage {
                name: name.to_string(),
            })
        })?;

        let view = TargetView::open(&self.project, package, platform)?;

        PackageBuilder::new(&self.project, package, &mut self.pool, view)
            .build(sink)
    }

    /// Tears the pool down, waiting for every worker to exit. Completions
    /// still in flight are drained and dropped.
    pub fn dispose(mut self) -> Result<(), Error> {
        self.pool.shutdown();

        loop {
            match self.pool.poll()? {
                PoolEvent::Terminated => break,
                event => {
                    debug!("ignoring {:?} during shutdown", event);
                }
            }
        }

        info!("project {:?} disposed", self.project.name);

        Ok(())
    }
}
