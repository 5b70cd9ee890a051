//! Persistent renderer processes, one per working directory.
//!
//! Starting a diagram renderer (a JVM for `PlantUML`) is expensive, so a
//! [`DiagramTaskPool`] keeps one long-lived process per working directory and
//! feeds it requests over a pipe:
//!
//! - each request is written to stdin, newline terminated;
//! - stdout is an unbroken stream of documents, each ending in `</svg>`;
//! - output is buffered across reads and split at every delimiter;
//! - completed documents resolve pending requests in strict FIFO order.
//!
//! When a process exits while requests are pending, the queue stays with the
//! task: a replacement process is started in the same directory and every
//! pending input is written again in order. Consecutive restarts without a
//! completed document are bounded; past the bound pending requests fail with
//! [`DiagramError::ProcessDied`].
//!
//! The registry is an ordinary value. Dropping the pool kills its processes.

use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::DiagramError;
use crate::plantuml::TaskCommand;

const DOCUMENT_END: &[u8] = b"</svg>";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RESTARTS: u32 = 3;

type Reply = Sender<Result<String, DiagramError>>;

/// Splits a byte stream into `</svg>`-terminated documents.
#[derive(Debug, Default)]
pub struct SvgStreamSplitter {
    buffer: Vec<u8>,
}

impl SvgStreamSplitter {
    /// Create an empty splitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every document it completes, in order.
    ///
    /// Surrounding whitespace of each document is trimmed. Bytes after the
    /// last delimiter stay buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let search_from = self.buffer.len().saturating_sub(DOCUMENT_END.len() - 1);
        self.buffer.extend_from_slice(chunk);

        let mut documents = Vec::new();
        let mut start = 0;
        let mut cursor = search_from;
        while let Some(pos) = find(&self.buffer[cursor..], DOCUMENT_END) {
            let end = cursor + pos + DOCUMENT_END.len();
            let document = String::from_utf8_lossy(&self.buffer[start..end]);
            documents.push(document.trim().to_owned());
            start = end;
            cursor = end;
        }
        self.buffer.drain(..start);
        documents
    }

    /// Number of buffered bytes not yet part of a complete document.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Registry of persistent renderer processes keyed by working directory.
pub struct DiagramTaskPool {
    command: TaskCommand,
    timeout: Duration,
    max_restarts: u32,
    tasks: Mutex<HashMap<PathBuf, Arc<DiagramTask>>>,
}

impl DiagramTaskPool {
    /// Create an empty pool that starts processes with `command`.
    #[must_use]
    pub fn new(command: TaskCommand) -> Self {
        Self {
            command,
            timeout: DEFAULT_TIMEOUT,
            max_restarts: DEFAULT_MAX_RESTARTS,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Set how long a request waits for its document.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how many consecutive restarts are attempted for pending requests.
    #[must_use]
    pub fn max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Render `input` with the process for `working_dir`, starting it if needed.
    ///
    /// Blocks until the matching document arrives, the restart bound is hit,
    /// or the timeout elapses. A timed-out request keeps its place in the
    /// queue so later documents still line up with their requests.
    pub fn render(&self, working_dir: &Path, input: &str) -> Result<String, DiagramError> {
        let task = self.task(working_dir);
        let reply = task.submit(input)?;
        match reply.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(DiagramError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(DiagramError::ProcessDied {
                dir: working_dir.display().to_string(),
                restarts: 0,
            }),
        }
    }

    /// Number of working directories with a task.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// Whether no task has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kill every process and fail pending requests.
    pub fn shutdown(&self) {
        let tasks: Vec<Arc<DiagramTask>> = self.tasks.lock().unwrap().drain().map(|(_, t)| t).collect();
        for task in tasks {
            task.shutdown();
        }
    }

    fn task(&self, working_dir: &Path) -> Arc<DiagramTask> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.entry(working_dir.to_path_buf()).or_insert_with(|| {
            Arc::new(DiagramTask {
                dir: working_dir.to_path_buf(),
                command: self.command.clone(),
                max_restarts: self.max_restarts,
                state: Mutex::new(TaskState::default()),
            })
        });
        Arc::clone(task)
    }
}

impl Drop for DiagramTaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct PendingRequest {
    input: String,
    reply: Reply,
}

struct RunningProcess {
    child: Child,
    stdin: Sender<String>,
}

#[derive(Default)]
struct TaskState {
    process: Option<RunningProcess>,
    pending: VecDeque<PendingRequest>,
    splitter: SvgStreamSplitter,
    /// Bumped on every spawn and on shutdown; readers of older processes stop.
    generation: u64,
    failed_restarts: u32,
}

impl TaskState {
    fn fail_pending(&mut self, error: impl Fn() -> DiagramError) {
        for request in self.pending.drain(..) {
            let _ = request.reply.send(Err(error()));
        }
    }
}

struct DiagramTask {
    dir: PathBuf,
    command: TaskCommand,
    max_restarts: u32,
    state: Mutex<TaskState>,
}

impl DiagramTask {
    fn submit(self: &Arc<Self>, input: &str) -> Result<Receiver<Result<String, DiagramError>>, DiagramError> {
        let mut line = input.to_owned();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        let (reply, receiver) = mpsc::channel();

        let mut state = self.state.lock().unwrap();
        if state.process.is_none() {
            self.spawn(&mut state)?;
        }
        if let Some(process) = &state.process {
            // A closed writer means the process is exiting; its reader replays the queue.
            let _ = process.stdin.send(line.clone());
        }
        state.pending.push_back(PendingRequest { input: line, reply });
        Ok(receiver)
    }

    fn spawn(self: &Arc<Self>, state: &mut TaskState) -> Result<(), DiagramError> {
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .current_dir(&self.dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DiagramError::spawn(&self.command.program, e))?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            return Err(DiagramError::InvalidOutput(
                "renderer process has no stdio pipes".to_owned(),
            ));
        };

        state.generation += 1;
        let generation = state.generation;
        tracing::info!(
            program = %self.command.program,
            dir = %self.dir.display(),
            generation,
            "Started renderer process"
        );

        let (inputs, input_rx) = mpsc::channel();
        thread::spawn(move || write_inputs(stdin, &input_rx));
        let task = Arc::clone(self);
        thread::spawn(move || task.read_documents(stdout, generation));
        thread::spawn(move || drain_stderr(stderr));

        state.process = Some(RunningProcess {
            child,
            stdin: inputs,
        });
        Ok(())
    }

    fn read_documents(self: Arc<Self>, mut stdout: ChildStdout, generation: u64) {
        let mut buf = [0u8; 8192];
        loop {
            match stdout.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let mut state = self.state.lock().unwrap();
                    if state.generation != generation {
                        return;
                    }
                    for document in state.splitter.push(&buf[..n]) {
                        state.failed_restarts = 0;
                        if let Some(request) = state.pending.pop_front() {
                            let _ = request.reply.send(Ok(document));
                        } else {
                            tracing::warn!(dir = %self.dir.display(), "Discarding unrequested renderer output");
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(dir = %self.dir.display(), error = %e, "Reading renderer output failed");
                    break;
                }
            }
        }
        self.handle_exit(generation);
    }

    fn handle_exit(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock().unwrap();
        if state.generation != generation {
            return;
        }
        if let Some(mut process) = state.process.take() {
            let _ = process.child.kill();
            let status = process.child.wait();
            tracing::debug!(dir = %self.dir.display(), ?status, "Renderer process exited");
        }
        // Output of the dead process is stale; pending inputs are replayed.
        state.splitter.clear();
        if state.pending.is_empty() {
            return;
        }

        state.failed_restarts += 1;
        let restarts = state.failed_restarts;
        let dir = self.dir.display().to_string();
        if restarts > self.max_restarts {
            tracing::warn!(dir = %dir, restarts, "Renderer keeps exiting, failing pending requests");
            state.failed_restarts = 0;
            state.fail_pending(|| DiagramError::ProcessDied {
                dir: dir.clone(),
                restarts,
            });
            return;
        }

        tracing::warn!(
            dir = %dir,
            pending = state.pending.len(),
            attempt = restarts,
            "Renderer process exited, restarting"
        );
        if let Err(e) = self.spawn(&mut state) {
            tracing::warn!(dir = %dir, error = %e, "Restarting renderer failed");
            state.fail_pending(|| DiagramError::ProcessDied {
                dir: dir.clone(),
                restarts,
            });
            return;
        }
        if let Some(process) = &state.process {
            for request in &state.pending {
                let _ = process.stdin.send(request.input.clone());
            }
        }
    }

    fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        if let Some(mut process) = state.process.take() {
            let _ = process.child.kill();
            let _ = process.child.wait();
        }
        state.splitter.clear();
        let dir = self.dir.display().to_string();
        state.fail_pending(|| DiagramError::ProcessDied {
            dir: dir.clone(),
            restarts: 0,
        });
    }
}

fn write_inputs(mut stdin: ChildStdin, inputs: &Receiver<String>) {
    for input in inputs {
        if stdin
            .write_all(input.as_bytes())
            .and_then(|()| stdin.flush())
            .is_err()
        {
            break;
        }
    }
}

fn drain_stderr(stderr: ChildStderr) {
    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
        tracing::debug!(target: "quill_diagrams::renderer", "{line}");
    }
}
