//! Running the external OCR tool.
//!
//! Three concerns live here:
//!
//! 1. **Search path construction.** GUI- and cron-launched processes often
//!    inherit a minimal `PATH` that misses package-manager install
//!    locations, so we run the tool with the union of a fixed fallback list
//!    and the inherited `PATH` (order-preserving, de-duplicated, fallback
//!    entries first) on top of the otherwise-inherited environment.
//! 2. **Existence probe.** Before the real command we resolve the tool name
//!    against that search path to an existing executable file. If that
//!    fails, the run fails fast with [`OcrError::ToolNotFound`] and the
//!    expensive command never starts.
//! 3. **Streaming execution.** One child at a time; stdout and stderr are
//!    read incrementally and delivered to the caller's chunk callback in
//!    arrival order, with everything drained after exit so trailing bytes
//!    are never lost.

use std::ffi::{OsStr, OsString};
use std::process::Stdio;

use futures::StreamExt as _;
use tokio::{
    io::AsyncReadExt as _,
    process::Command,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_stream::wrappers::ReceiverStream;

use crate::{error::OcrError, prelude::*};

/// The executable we drive.
pub static OCR_TOOL: &str = "ocrmypdf";

/// Directories searched in addition to the inherited `PATH`, in this order.
static FALLBACK_PATH: &[&str] = &[
    "/opt/local/bin",
    "/opt/local/sbin",
    "/usr/local/bin",
    "/usr/bin",
    "/bin",
    "/usr/sbin",
    "/sbin",
    "/opt/X11/bin",
    "/opt/homebrew/bin",
];

/// Read size for the output pipes. Chunk boundaries are arbitrary; partial
/// lines are fine.
const READ_BUF_SIZE: usize = 4096;

/// The terminal state of one tool invocation that was allowed to run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// The child's exit code.
    pub exit_code: i32,
    /// The combined stdout/stderr of this invocation, in arrival order.
    pub output: String,
}

/// Runs one external tool with a controlled search path.
#[derive(Clone, Debug)]
pub struct ToolRunner {
    tool: String,
    search_path: OsString,
}

impl ToolRunner {
    /// Create a runner for `tool`, unioning the fallback list with the
    /// inherited `PATH`.
    pub fn new(tool: impl Into<String>) -> Self {
        Self::with_inherited_path(tool, std::env::var_os("PATH").as_deref())
    }

    /// Like [`ToolRunner::new`], but with an explicit "inherited" `PATH`.
    pub fn with_inherited_path(tool: impl Into<String>, inherited: Option<&OsStr>) -> Self {
        Self {
            tool: tool.into(),
            search_path: build_search_path(inherited),
        }
    }

    /// The executable name this runner looks for.
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// The constructed `PATH` value used for the probe and the real run.
    pub fn search_path(&self) -> &OsStr {
        &self.search_path
    }

    /// Resolve the tool to an existing executable file on the search path.
    ///
    /// This is the `which`-equivalent existence probe: success requires a
    /// real file with the executable bit set, and failure means the main
    /// invocation is never attempted.
    pub async fn locate(&self) -> Result<PathBuf, OcrError> {
        for dir in std::env::split_paths(&self.search_path) {
            if dir.as_os_str().is_empty() {
                continue;
            }
            let candidate = dir.join(&self.tool);
            match tokio::fs::metadata(&candidate).await {
                Ok(meta) if meta.is_file() && is_executable(&meta) => {
                    trace!(tool = %self.tool, path = %candidate.display(), "probe hit");
                    return Ok(candidate);
                }
                _ => continue,
            }
        }
        Err(OcrError::ToolNotFound {
            tool: self.tool.clone(),
        })
    }

    /// Run the tool with `args`, streaming combined output to `on_chunk`.
    ///
    /// Chunks are delivered in arrival order and are also accumulated into
    /// the returned [`RunOutcome`]. After the child exits, any output still
    /// buffered in the pipes is drained before this returns. Exit code 0 is
    /// success; anything else becomes [`OcrError::ProcessFailed`] with the
    /// accumulated output as the detail.
    #[instrument(level = "debug", skip_all, fields(tool = %self.tool))]
    pub async fn run(
        &self,
        args: &[OsString],
        mut on_chunk: impl FnMut(&str) + Send,
    ) -> Result<RunOutcome, OcrError> {
        let exe = self.locate().await?;
        debug!(path = %exe.display(), "resolved tool");
        debug!(search_path = %self.search_path.to_string_lossy(), "PATH for child");

        let mut child = Command::new(&exe)
            .args(args)
            .env("PATH", &self.search_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| OcrError::Spawn {
                tool: self.tool.clone(),
                source,
            })?;

        // Both pipes feed one bounded channel; the single consumer below
        // appends chunks in the order they arrive.
        let (tx, rx) = mpsc::channel::<String>(16);
        let stdout = child.stdout.take().expect("child stdout was piped");
        let stderr = child.stderr.take().expect("child stderr was piped");
        let readers = [
            spawn_pipe_reader(stdout, tx.clone()),
            spawn_pipe_reader(stderr, tx),
        ];

        let mut combined = String::new();
        let mut chunks = ReceiverStream::new(rx);
        while let Some(chunk) = chunks.next().await {
            combined.push_str(&chunk);
            on_chunk(&chunk);
        }

        // The channel closed, so both pipes hit EOF and nothing can still
        // be in flight. Join the readers, then reap the child.
        for reader in readers {
            if let Err(err) = reader.await {
                warn!(error = %err, "output reader task panicked");
            }
        }
        let status = child.wait().await.map_err(|source| OcrError::Spawn {
            tool: self.tool.clone(),
            source,
        })?;

        let exit_code = status.code().unwrap_or(-1);
        if status.success() {
            debug!(exit_code, "tool finished");
            Ok(RunOutcome {
                exit_code,
                output: combined,
            })
        } else {
            let detail = if combined.trim().is_empty() {
                format!("process exited with code {exit_code}")
            } else {
                combined
            };
            Err(OcrError::ProcessFailed { exit_code, detail })
        }
    }
}

/// Read one pipe to EOF, forwarding chunks to the shared channel.
fn spawn_pipe_reader(
    mut pipe: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "error reading tool output");
                    break;
                }
            }
        }
    })
}

/// Union of the fallback list and the inherited `PATH`, order-preserving
/// and de-duplicated, fallback entries first.
fn build_search_path(inherited: Option<&OsStr>) -> OsString {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut push = |dir: PathBuf| {
        if !dir.as_os_str().is_empty() && !dirs.contains(&dir) {
            dirs.push(dir);
        }
    };
    for dir in FALLBACK_PATH {
        push(PathBuf::from(dir));
    }
    if let Some(inherited) = inherited {
        for dir in std::env::split_paths(inherited) {
            push(dir);
        }
    }
    std::env::join_paths(dirs).expect("search path entries cannot contain separators")
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt as _;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}
