//! Sequential batch processing.
//!
//! A batch drives the tool runner once per input file, strictly in input
//! order, never more than one child at a time. Progress lives in a shared
//! [`BatchState`] with a single-writer rule: only the running batch
//! mutates it, everyone else reads. A failing file records its error and
//! the batch keeps going; one bad input must not block the rest.

use std::{
    collections::VecDeque,
    ffi::OsString,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::{
    args::{display_args, ocr_args},
    error::OcrError,
    prelude::*,
    runner::ToolRunner,
    settings::Settings,
    target::resolve_target,
    transcript::Transcript,
};

/// How many produced output paths we keep for display, most recent first.
const OUTPUT_HISTORY_LIMIT: usize = 10;

/// How long the completion summary stays visible before the status resets
/// to idle.
const RESET_DELAY: Duration = Duration::from_secs(3);

/// Width of the separator rule written between files in the transcript.
const SEPARATOR_WIDTH: usize = 60;

/// Shared progress and status model for a batch.
///
/// Written only by the batch that is running; read by display code.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchState {
    /// Is a batch currently running?
    pub is_running: bool,
    /// Settings must not change while a batch runs.
    pub settings_locked: bool,
    /// 1-based index of the file being processed, 0 when idle.
    pub current_file: usize,
    /// Number of files in the running batch, 0 when idle.
    pub total_files: usize,
    /// Human-readable status line.
    pub status: String,
    /// The most recent per-file error, if any file has failed.
    pub last_error: Option<String>,
    /// Output paths of successful runs, most recent first, capped at
    /// [`OUTPUT_HISTORY_LIMIT`].
    pub recent_outputs: VecDeque<PathBuf>,
}

impl Default for BatchState {
    fn default() -> Self {
        Self {
            is_running: false,
            settings_locked: false,
            current_file: 0,
            total_files: 0,
            status: "Ready".to_owned(),
            last_error: None,
            recent_outputs: VecDeque::new(),
        }
    }
}

/// A cooperative cancellation flag, checked between files.
///
/// Cancelling never interrupts a child mid-run; the batch stops before
/// starting the next file.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress callbacks emitted while a batch runs.
#[derive(Clone, Debug)]
pub enum BatchEvent {
    /// A file is about to be processed. `number` is 1-based.
    FileStarted {
        number: usize,
        total: usize,
        source: PathBuf,
    },
    /// A chunk of combined tool output, in arrival order.
    Output(String),
    /// A file finished successfully and produced `target`.
    FileSucceeded { number: usize, target: PathBuf },
    /// A file failed; the batch continues with the next one.
    FileFailed { number: usize, error: String },
}

/// Drives the tool runner over a list of files, one at a time.
pub struct BatchRunner {
    runner: ToolRunner,
    settings: Settings,
    state: Arc<Mutex<BatchState>>,
    transcript: Arc<Transcript>,
    cancel: CancelFlag,
    reset_delay: Duration,
}

impl BatchRunner {
    /// Create a batch runner. `settings` are captured here and stay fixed
    /// for every file of every batch this runner drives.
    pub fn new(runner: ToolRunner, settings: Settings, transcript: Arc<Transcript>) -> Self {
        Self {
            runner,
            settings,
            state: Arc::new(Mutex::new(BatchState::default())),
            transcript,
            cancel: CancelFlag::default(),
            reset_delay: RESET_DELAY,
        }
    }

    /// Override how long the completion status stays visible before the
    /// state resets to idle.
    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = delay;
        self
    }

    /// The shared state, for display code.
    pub fn state(&self) -> Arc<Mutex<BatchState>> {
        self.state.clone()
    }

    /// The flag that stops the batch at the next per-file boundary.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Process `sources` in order. Returns the number of files that failed.
    ///
    /// Per-file errors are recorded on the shared state and reported via
    /// [`BatchEvent::FileFailed`], but never abort the loop: the worst
    /// outcome is a batch that completes with some files failed.
    #[instrument(level = "debug", skip_all, fields(files = sources.len()))]
    pub async fn run(
        &self,
        sources: &[PathBuf],
        mut observer: impl FnMut(BatchEvent) + Send,
    ) -> usize {
        let total = sources.len();
        self.update_state(|state| {
            state.is_running = true;
            state.settings_locked = true;
            state.total_files = total;
            state.current_file = 0;
            state.status = format!("Starting batch of {total} file(s)...");
        });

        let mut failed = 0;
        let mut completed = 0;
        let mut cancelled = false;
        for (index, source) in sources.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(completed, total, "batch cancelled");
                cancelled = true;
                break;
            }

            let number = index + 1;
            self.update_state(|state| {
                state.current_file = number;
                state.status = format!("Processing file {number} of {total}...");
            });
            observer(BatchEvent::FileStarted {
                number,
                total,
                source: source.clone(),
            });

            if total > 1 {
                self.emit(&mut observer, &file_separator(source));
            }

            match self.run_one(source, &mut observer).await {
                Ok(target) => {
                    info!(source = %source.display(), target = %target.display(), "file OCRed");
                    self.update_state(|state| {
                        state.recent_outputs.push_front(target.clone());
                        while state.recent_outputs.len() > OUTPUT_HISTORY_LIMIT {
                            state.recent_outputs.pop_back();
                        }
                        state.last_error = None;
                    });
                    observer(BatchEvent::FileSucceeded { number, target });
                }
                Err(err) => {
                    match &err {
                        OcrError::ProcessFailed { exit_code, .. } => {
                            error!(source = %source.display(), exit_code, "tool exited nonzero");
                        }
                        other => {
                            error!(source = %source.display(), error = %other, "file failed");
                        }
                    }
                    let message = err.to_string();
                    self.emit(&mut observer, &format!("\n\nError: {message}\n"));
                    self.update_state(|state| {
                        state.last_error = Some(message.clone());
                        state.status =
                            format!("Error processing file {number} of {total}: {message}");
                    });
                    observer(BatchEvent::FileFailed {
                        number,
                        error: message,
                    });
                    failed += 1;
                }
            }
            completed += 1;
        }

        self.update_state(|state| {
            state.is_running = false;
            state.settings_locked = false;
            state.status = if cancelled {
                format!("Cancelled after {completed} of {total} file(s)")
            } else {
                format!("Completed {total} file(s)")
            };
        });

        // Keep the completion summary visible for a moment, then go idle.
        // The output history and last error survive the reset.
        tokio::time::sleep(self.reset_delay).await;
        self.update_state(|state| {
            state.current_file = 0;
            state.total_files = 0;
            state.status = "Ready".to_owned();
        });

        failed
    }

    /// Resolve, build arguments for, and run a single file.
    async fn run_one(
        &self,
        source: &Path,
        observer: &mut (impl FnMut(BatchEvent) + Send),
    ) -> Result<PathBuf, OcrError> {
        let target = resolve_target(source, self.settings.in_place, &self.settings.output_folder);
        let args: Vec<OsString> = ocr_args(&self.settings, source, &target);
        self.emit(
            observer,
            &format!("Running: {} {}\n", self.runner.tool(), display_args(&args)),
        );

        let transcript = self.transcript.clone();
        let outcome = self
            .runner
            .run(&args, |chunk| {
                transcript.append(chunk);
                observer(BatchEvent::Output(chunk.to_owned()));
            })
            .await?;
        debug!(bytes = outcome.output.len(), "tool output captured");
        Ok(target)
    }

    /// Append text to the transcript and forward it to the observer.
    fn emit(&self, observer: &mut impl FnMut(BatchEvent), text: &str) {
        self.transcript.append(text);
        observer(BatchEvent::Output(text.to_owned()));
    }

    /// Single-writer state mutation.
    fn update_state(&self, mutate: impl FnOnce(&mut BatchState)) {
        let mut state = self.state.lock().expect("lock poisoned");
        mutate(&mut state);
    }
}

/// The banner written to the transcript ahead of each file in a multi-file
/// batch.
fn file_separator(source: &Path) -> String {
    let rule = "=".repeat(SEPARATOR_WIDTH);
    let name = source
        .file_name()
        .unwrap_or(source.as_os_str())
        .to_string_lossy();
    format!("\n\n{rule}\nProcessing file: {name}\n{rule}\n\n")
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    /// Install a stub OCR tool into a temp dir and return a runner that
    /// resolves it. The stub copies source to target (the last two
    /// arguments), echoes a progress line, and fails for any source whose
    /// name contains "bad". It gets a name nothing real shadows, so the
    /// fallback search locations can't pick up an actual install.
    fn stub_tool() -> (TempDir, ToolRunner) {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("ocrstub");
        std::fs::write(
            &script,
            concat!(
                "#!/bin/sh\n",
                "for a in \"$@\"; do src=\"$dst\"; dst=\"$a\"; done\n",
                "case \"$src\" in\n",
                "  *bad*) echo \"cannot read $src\" >&2; exit 2;;\n",
                "esac\n",
                "cp \"$src\" \"$dst\"\n",
                "echo \"processed $src\"\n",
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = ToolRunner::with_inherited_path("ocrstub", Some(dir.path().as_os_str()));
        (dir, runner)
    }

    /// A batch runner over the stub tool, writing outputs into `out`.
    fn stub_batch(runner: ToolRunner, out: &Path) -> BatchRunner {
        let mut settings = Settings::default();
        settings.output_folder = out.to_string_lossy().into_owned();
        BatchRunner::new(runner, settings, Arc::new(Transcript::new()))
            .with_reset_delay(Duration::ZERO)
    }

    /// Create `name` under `dir` with a little content, returning its path.
    fn source_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("contents of {name}")).unwrap();
        path
    }

    #[tokio::test]
    async fn a_failing_file_does_not_stop_the_batch() {
        let (_tool_dir, runner) = stub_tool();
        let work = TempDir::new().unwrap();
        let out = work.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let sources = vec![
            source_file(work.path(), "one.pdf"),
            source_file(work.path(), "bad two.pdf"),
            source_file(work.path(), "three.pdf"),
        ];

        let transcript = Arc::new(Transcript::new());
        let mut settings = Settings::default();
        settings.output_folder = out.to_string_lossy().into_owned();
        let batch = BatchRunner::new(runner, settings, transcript.clone())
            .with_reset_delay(Duration::ZERO);
        let failed = batch.run(&sources, |_| {}).await;
        assert_eq!(failed, 1);

        let state = batch.state();
        let state = state.lock().unwrap();
        // Only the two successful files made it into the history, most
        // recent first.
        let outputs: Vec<_> = state.recent_outputs.iter().cloned().collect();
        assert_eq!(
            outputs,
            [out.join("three ocr.pdf"), out.join("one ocr.pdf")]
        );
        assert!(out.join("one ocr.pdf").exists());
        assert!(!out.join("bad two ocr.pdf").exists());
        // File 3's success cleared the sticky error again, but the failure
        // stays on record in the transcript.
        assert_eq!(state.last_error, None);
        let log = transcript.snapshot();
        assert!(log.contains("Error: "), "no error annotation in: {log}");
        assert!(log.contains("cannot read"));
        assert!(log.contains("bad two.pdf"));
    }

    #[tokio::test]
    async fn a_failure_on_the_last_file_stays_in_last_error() {
        let (_tool_dir, runner) = stub_tool();
        let work = TempDir::new().unwrap();
        let out = work.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let sources = vec![
            source_file(work.path(), "fine.pdf"),
            source_file(work.path(), "bad.pdf"),
        ];

        let batch = stub_batch(runner, &out);
        let failed = batch.run(&sources, |_| {}).await;
        assert_eq!(failed, 1);

        let state = batch.state();
        let state = state.lock().unwrap();
        let err = state.last_error.as_deref().unwrap();
        assert!(err.contains("cannot read"), "unexpected error: {err}");
        assert!(err.contains("bad.pdf"));
    }

    #[tokio::test]
    async fn terminal_status_shows_before_the_idle_reset() {
        let (_tool_dir, runner) = stub_tool();
        let work = TempDir::new().unwrap();
        let out = work.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let sources = vec![
            source_file(work.path(), "a.pdf"),
            source_file(work.path(), "b.pdf"),
            source_file(work.path(), "c.pdf"),
        ];

        let mut settings = Settings::default();
        settings.output_folder = out.to_string_lossy().into_owned();
        let batch = Arc::new(
            BatchRunner::new(runner, settings, Arc::new(Transcript::new()))
                .with_reset_delay(Duration::from_millis(500)),
        );
        let state = batch.state();

        let task = {
            let batch = batch.clone();
            tokio::spawn(async move { batch.run(&sources, |_| {}).await })
        };

        // Wait for the loop to finish, then catch the completion summary
        // inside the reset window.
        loop {
            {
                let state = state.lock().unwrap();
                if !state.is_running && state.total_files == 3 {
                    assert_eq!(state.status, "Completed 3 file(s)");
                    assert!(!state.settings_locked);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        task.await.unwrap();
        let state = state.lock().unwrap();
        assert_eq!(state.status, "Ready");
        assert_eq!(state.current_file, 0);
        assert_eq!(state.total_files, 0);
        // History survives the reset.
        assert_eq!(state.recent_outputs.len(), 3);
    }

    #[tokio::test]
    async fn output_history_is_capped_at_ten() {
        let (_tool_dir, runner) = stub_tool();
        let work = TempDir::new().unwrap();
        let out = work.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let sources: Vec<PathBuf> = (1..=11)
            .map(|i| source_file(work.path(), &format!("doc{i:02}.pdf")))
            .collect();

        let batch = stub_batch(runner, &out);
        let failed = batch.run(&sources, |_| {}).await;
        assert_eq!(failed, 0);

        let state = batch.state();
        let state = state.lock().unwrap();
        assert_eq!(state.recent_outputs.len(), 10);
        // Most recent first; the first file has been evicted.
        assert_eq!(state.recent_outputs[0], out.join("doc11 ocr.pdf"));
        assert!(!state.recent_outputs.contains(&out.join("doc01 ocr.pdf")));
    }

    #[tokio::test]
    async fn separator_banners_appear_only_in_multi_file_batches() {
        let (_tool_dir, runner) = stub_tool();
        let work = TempDir::new().unwrap();
        let out = work.path().join("out");
        std::fs::create_dir(&out).unwrap();

        // Single file: no banner.
        let transcript = Arc::new(Transcript::new());
        let mut settings = Settings::default();
        settings.output_folder = out.to_string_lossy().into_owned();
        let batch = BatchRunner::new(runner.clone(), settings.clone(), transcript.clone())
            .with_reset_delay(Duration::ZERO);
        batch
            .run(&[source_file(work.path(), "solo.pdf")], |_| {})
            .await;
        assert!(!transcript.snapshot().contains("Processing file: solo.pdf"));

        // Two files: banners for both.
        let transcript = Arc::new(Transcript::new());
        let batch = BatchRunner::new(runner, settings, transcript.clone())
            .with_reset_delay(Duration::ZERO);
        batch
            .run(
                &[
                    source_file(work.path(), "x.pdf"),
                    source_file(work.path(), "y.pdf"),
                ],
                |_| {},
            )
            .await;
        let log = transcript.snapshot();
        assert!(log.contains("Processing file: x.pdf"));
        assert!(log.contains("Processing file: y.pdf"));
        assert!(log.contains(&"=".repeat(60)));
    }

    #[tokio::test]
    async fn transcript_receives_tool_output_in_order() {
        let (_tool_dir, runner) = stub_tool();
        let work = TempDir::new().unwrap();
        let out = work.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let source = source_file(work.path(), "doc.pdf");

        let transcript = Arc::new(Transcript::new());
        let mut settings = Settings::default();
        settings.output_folder = out.to_string_lossy().into_owned();
        let batch = BatchRunner::new(runner, settings, transcript.clone())
            .with_reset_delay(Duration::ZERO);

        let mut events = Vec::new();
        batch.run(std::slice::from_ref(&source), |e| events.push(e)).await;

        let log = transcript.snapshot();
        let running = log.find("Running: ocrstub").unwrap();
        let processed = log.find("processed").unwrap();
        assert!(running < processed, "command line should precede tool output");

        assert!(events.iter().any(|e| matches!(
            e,
            BatchEvent::FileSucceeded { number: 1, target } if target == &out.join("doc ocr.pdf")
        )));
    }

    #[tokio::test]
    async fn cancellation_stops_at_the_file_boundary() {
        let (_tool_dir, runner) = stub_tool();
        let work = TempDir::new().unwrap();
        let out = work.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let sources = vec![
            source_file(work.path(), "a.pdf"),
            source_file(work.path(), "b.pdf"),
        ];

        let batch = stub_batch(runner, &out);
        let cancel = batch.cancel_flag();

        // Cancel as soon as the first file starts; the second must never
        // run.
        batch
            .run(&sources, |event| {
                if matches!(event, BatchEvent::FileStarted { number: 1, .. }) {
                    cancel.cancel();
                }
            })
            .await;

        assert!(out.join("a ocr.pdf").exists());
        assert!(!out.join("b ocr.pdf").exists());
        let state = batch.state();
        let state = state.lock().unwrap();
        assert_eq!(state.recent_outputs.len(), 1);
    }

    #[tokio::test]
    async fn tool_not_found_is_recorded_but_not_fatal_to_the_batch() {
        let work = TempDir::new().unwrap();
        let out = work.path().join("out");
        std::fs::create_dir(&out).unwrap();
        // No stub installed anywhere on this search path.
        let runner = ToolRunner::with_inherited_path("no-such-ocr-tool", None);
        let sources = vec![
            source_file(work.path(), "a.pdf"),
            source_file(work.path(), "b.pdf"),
        ];

        let batch = stub_batch(runner, &out);
        let failed = batch.run(&sources, |_| {}).await;
        assert_eq!(failed, 2);

        let state = batch.state();
        let state = state.lock().unwrap();
        assert_eq!(state.status, "Ready");
        assert!(state.last_error.as_deref().unwrap().contains("not found"));
        assert!(state.recent_outputs.is_empty());
    }
}
