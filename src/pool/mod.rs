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

//! The pool of data compiler processes.
//!
//! The pool owns every supervisor, keyed two ways: by launch identity, so
//! that routes sharing an executable share a worker, and by route, so that a
//! `(resource type, platform)` pair finds its worker. Each worker has a FIFO
//! queue with a single in-flight job; everything else waits.
//!
//! All pool state is driven from `poll()`, the engine's one wait point.
//! Events produced while handling a call (for example a `Skipped` for a
//! route with no compiler) are queued and delivered by a later `poll()`,
//! never from inside the call that caused them.

mod worker;

pub use self::worker::{WorkerId, WorkerSpec};

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};

use log::{debug, info, warn};

use self::worker::{Disposition, Notification, Supervisor};
use crate::error::Error;
use crate::ipc::{BuildRequest, BuildResult, Message};
use crate::project::Pipeline;
use crate::res::{SourceEntry, GENERIC_PLATFORM};
use crate::util::PathExt;

/// One unit of work for a compiler.
#[derive(Clone, Debug)]
pub struct Job {
    /// Absolute path of the source file.
    pub source_path: PathBuf,

    /// Absolute path of the target grouping (the hashed stem).
    pub target_path: PathBuf,

    /// The source record to be inserted if the build succeeds.
    pub source_entry: SourceEntry,

    pub resource_name: String,
    pub resource_type: String,
    pub platform: String,
}

/// Events surfaced by `poll()`.
#[derive(Debug)]
pub enum PoolEvent {
    /// Every pipeline worker has started.
    Ready,

    /// A job was handed to its worker.
    Started {
        resource_name: String,
        source_path: PathBuf,
    },

    /// A worker answered the job at the head of its queue.
    Complete {
        job: Job,
        compiler_name: String,
        result: BuildResult,
    },

    /// A job was dropped without being dispatched.
    Skipped { job: Job, reason: String },

    /// A worker failed to start, or died for good with jobs still queued.
    Error {
        job: Option<Job>,
        message: String,
    },

    /// The last worker has exited after a shutdown request.
    Terminated,
}

/// The identity a worker is deduplicated by: two routes whose working
/// directory, executable, and argument vector all match share one process.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
struct LaunchKey {
    working_dir: PathBuf,
    program: PathBuf,
    arguments: Vec<String>,
}

struct WorkerSlot {
    supervisor: Supervisor,
    name: String,
    routes: Vec<String>,
    queue: VecDeque<Job>,

    /// Cached protocol version from `VERSION_DATA`.
    version: u32,

    /// The worker has started and may receive build requests.
    ready: bool,

    /// A `BUILD_REQUEST` for the queue head is outstanding.
    busy: bool,

    /// The worker has not exited terminally.
    alive: bool,
}

pub struct CompilerPool {
    workers: Vec<WorkerSlot>,
    by_launch: HashMap<LaunchKey, WorkerId>,
    by_route: HashMap<String, WorkerId>,

    tx: Sender<Notification>,
    rx: Receiver<Notification>,

    pending: VecDeque<PoolEvent>,

    /// Workers spawned but not yet started.
    starting: usize,

    /// A pipeline worker failed to spawn; the pool will never become ready.
    start_failed: bool,

    ready_announced: bool,
    shutting_down: bool,
    terminated_announced: bool,
}

impl Default for CompilerPool {
    fn default() -> CompilerPool {
        CompilerPool::new()
    }
}

impl CompilerPool {
    pub fn new() -> CompilerPool {
        let (tx, rx) = channel();

        CompilerPool {
            workers: Vec::new(),
            by_launch: HashMap::new(),
            by_route: HashMap::new(),
            tx,
            rx,
            pending: VecDeque::new(),
            starting: 0,
            start_failed: false,
            ready_announced: false,
            shutting_down: false,
            terminated_announced: false,
        }
    }

    /// Launches one worker per distinct launch identity in the pipeline.
    /// `Ready` is emitted once every new worker has started; with an empty
    /// pipeline that is immediately.
    pub fn startup(
        &mut self,
        processors_dir: &Path,
        default_working_dir: &Path,
        pipeline: &Pipeline,
    ) {
        for (route, spec) in pipeline.iter() {
            let program = if spec.path.is_absolute() {
                spec.path.normalize()
            } else {
                processors_dir.join(&spec.path).normalize()
            };

            let working_dir = spec
                .working_directory
                .as_deref()
                .unwrap_or(default_working_dir)
                .normalize();

            let key = LaunchKey {
                working_dir: working_dir.clone(),
                program: program.clone(),
                arguments: spec.arguments.clone(),
            };

            if let Some(&id) = self.by_launch.get(&key) {
                self.workers[id].routes.push(route.clone());
                self.by_route.insert(route.clone(), id);
                debug!("route {} shares worker {}", route, id);
                continue;
            }

            let id = self.workers.len();

            let name = program
                .file_stem()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| program.to_string_lossy().into_owned());

            let mut supervisor = Supervisor::new(
                id,
                WorkerSpec {
                    program,
                    arguments: spec.arguments.clone(),
                    working_dir,
                    env: spec.extra_environment.clone(),
                    env_hides: spec.hide_environment.clone(),
                    max_restarts: spec.max_restart_count,
                    suppress_stdio: spec.suppress_stdio,
                },
                self.tx.clone(),
            );

            let alive = match supervisor.start() {
                Ok(()) => {
                    self.starting += 1;
                    true
                }
                Err(err) => {
                    self.start_failed = true;
                    self.pending.push_back(PoolEvent::Error {
                        job: None,
                        message: format!("{}", err),
                    });
                    false
                }
            };

            self.by_launch.insert(key, id);
            self.by_route.insert(route.clone(), id);
            self.workers.push(WorkerSlot {
                supervisor,
                name,
                routes: vec![route.clone()],
                queue: VecDeque::new(),
                version: 1,
                ready: false,
                busy: false,
                alive,
            });
        }

        if self.starting == 0 && !self.start_failed && !self.ready_announced
        {
            // Nothing to wait for: the pipeline is empty.
            self.ready_announced = true;
            self.pending.push_back(PoolEvent::Ready);
        }

        info!(
            "compiler pool: {} route(s), {} worker(s)",
            self.by_route.len(),
            self.workers.len()
        );
    }

    /// The worker serving a `(resource type, platform)` pair: the platform
    /// route wins over the generic route.
    pub fn find_compiler(
        &self,
        resource_type: &str,
        platform: &str,
    ) -> Option<WorkerId> {
        if platform != GENERIC_PLATFORM {
            let route = format!("{}.{}", resource_type, platform);

            if let Some(&id) = self.by_route.get(&route) {
                return Some(id);
            }
        }

        self.by_route.get(resource_type).copied()
    }

    /// The cached protocol version of the worker serving a route.
    pub fn compiler_version(
        &self,
        resource_type: &str,
        platform: &str,
    ) -> Option<u32> {
        self.find_compiler(resource_type, platform)
            .map(|id| self.workers[id].version)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues a job on the worker serving its route. Jobs with no worker are
    /// skipped; a queue that was idle dispatches immediately.
    pub fn submit(&mut self, job: Job) {
        let id = match self.find_compiler(&job.resource_type, &job.platform)
        {
            Some(id) => id,
            None => {
                self.pending.push_back(PoolEvent::Skipped {
                    reason: format!(
                        "No data compiler for resource type {}",
                        job.resource_type
                    ),
                    job,
                });
                return;
            }
        };

        if !self.workers[id].alive {
            let name = self.workers[id].name.clone();
            self.pending.push_back(PoolEvent::Error {
                job: Some(job),
                message: format!("Compiler {} is not running", name),
            });
            return;
        }

        self.workers[id].queue.push_back(job);

        if self.workers[id].ready && !self.workers[id].busy {
            self.begin_head(id);
        }
    }

    /// Requests terminal stop on every worker. `Terminated` is emitted when
    /// the last one is gone.
    pub fn shutdown(&mut self) {
        self.shutting_down = true;

        for slot in &mut self.workers {
            debug!(
                "stopping {} (routes: {})",
                slot.name,
                slot.routes.join(", ")
            );
            slot.supervisor.stop(false);
        }

        self.check_terminated();
    }

    /// Delivers the next pool event, blocking on worker I/O as needed. This
    /// is the engine's scheduler: all pool and supervisor state changes
    /// happen inside this call, one notification at a time.
    pub fn poll(&mut self) -> Result<PoolEvent, Error> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }

            let notification = self.rx.recv().map_err(|_| {
                failure::format_err!("Worker event channel closed")
            })?;

            self.handle(notification);
        }
    }

    fn handle(&mut self, notification: Notification) {
        match notification {
            Notification::Started(id) => {
                self.workers[id].ready = true;

                // Always the first thing a worker hears from us.
                self.workers[id].supervisor.send(&Message::VersionQuery);

                if self.starting > 0 {
                    self.starting -= 1;

                    if self.starting == 0
                        && !self.start_failed
                        && !self.ready_announced
                    {
                        self.ready_announced = true;
                        self.pending.push_back(PoolEvent::Ready);
                    }
                }

                if !self.workers[id].busy
                    && !self.workers[id].queue.is_empty()
                {
                    self.begin_head(id);
                }
            }
            Notification::Message(id, message) => {
                self.handle_message(id, message)
            }
            Notification::Eof(id) => self.handle_eof(id),
        }
    }

    fn handle_message(&mut self, id: WorkerId, message: Message) {
        if !self.workers[id].alive {
            return;
        }

        match message {
            Message::VersionData(data) => {
                debug!(
                    "worker {} speaks protocol version {}",
                    id, data.version
                );
                self.workers[id].version = data.version;
            }
            Message::BuildResult(result) => {
                let slot = &mut self.workers[id];
                slot.busy = false;

                match slot.queue.pop_front() {
                    Some(job) => {
                        let compiler_name = slot.name.clone();
                        self.pending.push_back(PoolEvent::Complete {
                            job,
                            compiler_name,
                            result,
                        });
                    }
                    None => {
                        warn!(
                            "worker {}: unsolicited build result for {:?}",
                            id, result.source_path
                        );
                    }
                }

                if self.workers[id].ready
                    && !self.workers[id].queue.is_empty()
                {
                    self.begin_head(id);
                }
            }
            other => {
                warn!("worker {}: unexpected message {:?}", id, other);
            }
        }
    }

    fn handle_eof(&mut self, id: WorkerId) {
        match self.workers[id].supervisor.handle_exit() {
            Disposition::Restarted => {
                info!("compiler {} restarted", self.workers[id].name);

                self.workers[id].ready = true;
                self.workers[id].supervisor.send(&Message::VersionQuery);

                // The job at the head of the queue never completed. It is
                // re-issued to the replacement; the started event for it was
                // already delivered.
                let request = self.workers[id].queue.front().map(|job| {
                    Message::BuildRequest(BuildRequest {
                        source_path: job.source_path.clone(),
                        target_path: job.target_path.clone(),
                        platform: job.platform.clone(),
                    })
                });

                if let Some(request) = request {
                    self.workers[id].busy = true;
                    self.workers[id].supervisor.send(&request);
                }
            }
            Disposition::Exited => {
                debug!("compiler {} exited", self.workers[id].name);
                self.retire(id, None);
            }
            Disposition::SpawnFailed(err) => {
                self.pending.push_back(PoolEvent::Error {
                    job: None,
                    message: format!(
                        "Failed to restart compiler {}: {}",
                        self.workers[id].name, err
                    ),
                });
                self.retire(id, Some(err));
            }
        }
    }

    /// Marks a worker terminally gone and fails whatever it still had
    /// queued. No synthetic build results: the databases stay untouched.
    fn retire(&mut self, id: WorkerId, _cause: Option<Error>) {
        let slot = &mut self.workers[id];

        slot.alive = false;
        slot.ready = false;
        slot.busy = false;

        if self.shutting_down {
            slot.queue.clear();
        } else {
            let name = slot.name.clone();

            while let Some(job) = slot.queue.pop_front() {
                self.pending.push_back(PoolEvent::Error {
                    job: Some(job),
                    message: format!(
                        "Compiler {} exited before finishing",
                        name
                    ),
                });
            }
        }

        self.check_terminated();
    }

    fn check_terminated(&mut self) {
        if !self.shutting_down || self.terminated_announced {
            return;
        }

        if self
            .workers
            .iter()
            .all(|slot| !slot.supervisor.is_running())
        {
            self.terminated_announced = true;
            self.pending.push_back(PoolEvent::Terminated);
        }
    }

    /// Emits `Started` and sends the build request for the queue head.
    fn begin_head(&mut self, id: WorkerId) {
        let (started, request) = match self.workers[id].queue.front() {
            Some(job) => (
                PoolEvent::Started {
                    resource_name: job.resource_name.clone(),
                    source_path: job.source_path.clone(),
                },
                Message::BuildRequest(BuildRequest {
                    source_path: job.source_path.clone(),
                    target_path: job.target_path.clone(),
                    platform: job.platform.clone(),
                }),
            ),
            None => return,
        };

        self.pending.push_back(started);

        let slot = &mut self.workers[id];
        slot.busy = true;
        slot.supervisor.send(&request);
    }
}
