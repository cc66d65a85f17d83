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

//! Supervision of a single data compiler process.
//!
//! A supervisor owns one child and a reader thread on its stdout. The reader
//! thread never touches engine state: it forwards parsed messages and the
//! eventual EOF over a channel, and the pool reacts to them on the engine
//! thread. Restart decisions therefore always happen between engine turns,
//! never in the middle of one.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::Sender;
use std::thread;

use log::{debug, warn};

use crate::error::{Error, ResultExt};
use crate::ipc::Message;

pub type WorkerId = usize;

/// Everything needed to launch (and re-launch) one worker process.
#[derive(Clone, Debug)]
pub struct WorkerSpec {
    pub program: PathBuf,
    pub arguments: Vec<String>,
    pub working_dir: PathBuf,

    /// Environment variables added on top of the inherited environment.
    pub env: BTreeMap<String, String>,

    /// Inherited environment variables withheld from the child.
    pub env_hides: Vec<String>,

    /// Restart cap for crashed workers. Zero means no cap.
    pub max_restarts: u32,

    /// Discard the child's stderr instead of inheriting ours.
    pub suppress_stdio: bool,
}

/// Raw notifications from worker I/O, serialized through the pool's channel.
#[derive(Debug)]
pub enum Notification {
    /// The child was spawned by a fresh `start()` call.
    Started(WorkerId),

    /// The child sent an IPC message.
    Message(WorkerId, Message),

    /// The child's stdout reached EOF; the child has exited or is about to.
    Eof(WorkerId),
}

/// What became of a worker after its child went away.
pub enum Disposition {
    /// A replacement child is running.
    Restarted,

    /// The exit is terminal: a stop was requested or the restart cap was
    /// reached.
    Exited,

    /// A restart was due but the replacement could not be spawned.
    SpawnFailed(Error),
}

pub struct Supervisor {
    id: WorkerId,
    spec: WorkerSpec,
    notify: Sender<Notification>,

    child: Option<Child>,
    stdin: Option<ChildStdin>,

    restarts: u32,
    restart_allowed: bool,
}

impl Supervisor {
    pub fn new(
        id: WorkerId,
        spec: WorkerSpec,
        notify: Sender<Notification>,
    ) -> Supervisor {
        Supervisor {
            id,
            spec,
            notify,
            child: None,
            stdin: None,
            restarts: 0,
            restart_allowed: true,
        }
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Spawns the child. Resets the restart counter: this is a fresh start,
    /// not a restart. A `Started` notification is delivered asynchronously
    /// on success.
    pub fn start(&mut self) -> Result<(), Error> {
        self.restarts = 0;
        self.restart_allowed = true;
        self.spawn(true)
    }

    fn spawn(&mut self, notify_started: bool) -> Result<(), Error> {
        let mut command = Command::new(&self.spec.program);

        command
            .args(&self.spec.arguments)
            .current_dir(&self.spec.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if self.spec.suppress_stdio {
                Stdio::null()
            } else {
                Stdio::inherit()
            });

        for name in &self.spec.env_hides {
            command.env_remove(name);
        }

        command.envs(&self.spec.env);

        let mut child = command.spawn().with_context(|_| {
            format!("Failed to spawn compiler {:?}", self.spec.program)
        })?;

        // Both handles exist because both streams are piped.
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| {
            failure::format_err!(
                "No stdout handle for {:?}",
                self.spec.program
            )
        })?;

        self.stdin = stdin;
        self.child = Some(child);

        debug!("worker {}: spawned {:?}", self.id, self.spec.program);

        // The notification goes out before the reader thread exists, so
        // `Started` always precedes the first `Message`.
        if notify_started {
            let _ = self.notify.send(Notification::Started(self.id));
        }

        let id = self.id;
        let notify = self.notify.clone();

        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);

            loop {
                match Message::read_from(&mut reader) {
                    Ok(Some(message)) => {
                        if notify
                            .send(Notification::Message(id, message))
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!("worker {}: bad message: {}", id, err);
                    }
                }
            }

            let _ = notify.send(Notification::Eof(id));
        });

        Ok(())
    }

    /// Sends a message to the child. A no-op if the pipe is not connected.
    pub fn send(&mut self, message: &Message) {
        if let Some(stdin) = &mut self.stdin {
            if message.write_line(stdin).is_err() {
                // The peer is gone. Its EOF notification will follow.
                self.stdin = None;
            }
        }
    }

    /// Requests termination. With `allow_restart = false` the next exit is
    /// terminal; otherwise the child is recycled like a crash.
    pub fn stop(&mut self, allow_restart: bool) {
        if !allow_restart {
            self.restart_allowed = false;
        }

        self.stdin = None;

        if let Some(child) = &mut self.child {
            debug!("worker {}: stopping", self.id);
            let _ = child.kill();
        }
    }

    /// Reacts to the child going away: reaps it, then either respawns or
    /// declares the exit terminal.
    pub fn handle_exit(&mut self) -> Disposition {
        if let Some(mut child) = self.child.take() {
            // Usually the child is already gone; the kill covers a worker
            // that closed its stdout while staying alive.
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("worker {}: exited with {}", self.id, status);
                }
                _ => {
                    let _ = child.kill();
                    let _ = child.wait();
                }
            }
        }

        self.stdin = None;

        if !self.restart_allowed {
            return Disposition::Exited;
        }

        if self.spec.max_restarts > 0
            && self.restarts >= self.spec.max_restarts
        {
            warn!(
                "worker {}: restart cap ({}) reached",
                self.id, self.spec.max_restarts
            );
            return Disposition::Exited;
        }

        self.restarts += 1;
        debug!(
            "worker {}: restarting (attempt {})",
            self.id, self.restarts
        );

        match self.spawn(false) {
            Ok(()) => Disposition::Restarted,
            Err(err) => Disposition::SpawnFailed(err),
        }
    }
}
