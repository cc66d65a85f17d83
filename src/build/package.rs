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

//! Driving the build of one package and accounting for it.
//!
//! The package builder owns the run's counters and the target view, feeds
//! the target builder's work through the compiler pool, translates what
//! happens into the public event surface, and persists the databases and
//! the manifest when the run concludes.

use crate::build::target::TargetBuilder;
use crate::error::Error;
use crate::events::{
    BuildEvent, CompileEvent, ErrorEvent, EventSink, FinishEvent,
    IgnoreEvent, StartEvent, SuccessEvent,
};
use crate::pool::{CompilerPool, PoolEvent};
use crate::project::{Package, Project};
use crate::view::TargetView;

/// The per-run counters. `expect` tracks outstanding pool replies; a started
/// run is complete exactly when it reaches zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct Counters {
    pub expect: usize,
    pub errors: usize,
    pub success: usize,
    pub skipped: usize,
    pub started: bool,
}

/// What a finished package build amounted to.
#[derive(Clone, Copy, Debug)]
pub struct BuildSummary {
    pub success: bool,
    pub built: usize,
    pub errors: usize,
    pub skipped: usize,
}

pub struct PackageBuilder<'a> {
    project: &'a Project,
    package: &'a Package,
    pool: &'a mut CompilerPool,
    view: TargetView,
    counters: Counters,
}

impl<'a> PackageBuilder<'a> {
    pub fn new(
        project: &'a Project,
        package: &'a Package,
        pool: &'a mut CompilerPool,
        view: TargetView,
    ) -> PackageBuilder<'a> {
        PackageBuilder {
            project,
            package,
            pool,
            view,
            counters: Counters::default(),
        }
    }

    pub fn view(&self) -> &TargetView {
        &self.view
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Runs the build to completion.
    pub fn build(
        &mut self,
        sink: &mut dyn EventSink,
    ) -> Result<BuildSummary, Error> {
        sink.event(&BuildEvent::Start(StartEvent {
            package: self.package.name.clone(),
            platform: self.view.platform().to_string(),
        }));

        self.counters.started = true;

        let mut builder =
            TargetBuilder::new(self.project, self.package, &mut self.view);

        let (candidates, skips) = builder.enumerate()?;

        for skip in skips {
            self.counters.skipped += 1;
            sink.event(&BuildEvent::Ignore(IgnoreEvent {
                source_path: skip.source_path,
                reason: skip.reason,
            }));
        }

        let (jobs, skips) = builder.decide(candidates);

        for skip in skips {
            self.counters.skipped += 1;
            sink.event(&BuildEvent::Ignore(IgnoreEvent {
                source_path: skip.source_path,
                reason: skip.reason,
            }));
        }

        for job in jobs {
            self.counters.expect += 1;
            self.pool.submit(job);
        }

        while self.counters.expect > 0 {
            match self.pool.poll()? {
                PoolEvent::Started {
                    resource_name,
                    source_path,
                } => {
                    sink.event(&BuildEvent::Compile(CompileEvent {
                        name: resource_name,
                        source_path,
                    }));
                }
                PoolEvent::Complete {
                    job,
                    compiler_name,
                    result,
                } => {
                    self.counters.expect -= 1;

                    if result.success {
                        match builder.ingest(&job, &compiler_name, &result)
                        {
                            Ok(outputs) => {
                                self.counters.success += 1;
                                sink.event(&BuildEvent::Success(
                                    SuccessEvent {
                                        name: job.resource_name,
                                        source_path: job.source_path,
                                        outputs,
                                    },
                                ));
                            }
                            Err(err) => {
                                self.counters.errors += 1;
                                sink.event(&BuildEvent::Error(ErrorEvent {
                                    source_path: Some(job.source_path),
                                    message: format!("{}", err),
                                }));
                            }
                        }
                    } else {
                        self.counters.errors += 1;
                        sink.event(&BuildEvent::Error(ErrorEvent {
                            source_path: Some(job.source_path),
                            message: if result.errors.is_empty() {
                                "build failed".to_string()
                            } else {
                                result.errors.join("; ")
                            },
                        }));
                    }
                }
                PoolEvent::Skipped { job, reason } => {
                    self.counters.expect -= 1;
                    self.counters.skipped += 1;
                    sink.event(&BuildEvent::Ignore(IgnoreEvent {
                        source_path: job.source_path,
                        reason,
                    }));
                }
                PoolEvent::Error { job, message } => {
                    self.counters.errors += 1;

                    let source_path = match job {
                        Some(job) => {
                            self.counters.expect -= 1;
                            Some(job.source_path)
                        }
                        None => None,
                    };

                    sink.event(&BuildEvent::Error(ErrorEvent {
                        source_path,
                        message,
                    }));
                }
                PoolEvent::Ready | PoolEvent::Terminated => {}
            }
        }

        // A run that compiled nothing keeps the existing manifest (and its
        // build date) as long as the databases also went untouched.
        let built = self.counters.success + self.counters.errors > 0;

        if let Err(err) = builder.write_manifest(built) {
            self.counters.errors += 1;
            sink.event(&BuildEvent::Error(ErrorEvent {
                source_path: None,
                message: format!("{}", err),
            }));
        }

        drop(builder);

        if let Err(err) = self.view.save() {
            self.counters.errors += 1;
            sink.event(&BuildEvent::Error(ErrorEvent {
                source_path: None,
                message: format!("{}", err),
            }));
        }

        let summary = BuildSummary {
            success: self.counters.errors == 0,
            built: self.counters.success,
            errors: self.counters.errors,
            skipped: self.counters.skipped,
        };

        sink.event(&BuildEvent::Finish(FinishEvent {
            package: self.package.name.clone(),
            platform: self.view.platform().to_string(),
            success: summary.success,
            built: summary.built,
            errors: summary.errors,
            skipped: summary.skipped,
        }));

        Ok(summary)
    }
}
