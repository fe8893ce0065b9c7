//! The `run` subcommand.

use std::{sync::Arc, time::Duration};

use clap::Args;

use crate::{
    batch::{BatchEvent, BatchRunner},
    prelude::*,
    runner::{OCR_TOOL, ToolRunner},
    settings::Settings,
    transcript::Transcript,
    ui::{ProgressConfig, Ui},
};

/// `run` command-line arguments.
#[derive(Debug, Args)]
pub struct RunOpts {
    /// PDF files to OCR, processed in order.
    #[clap(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Settings file to load (and save with `--save-settings`). Defaults
    /// to the platform config directory.
    #[clap(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Language pack(s) to OCR with. May be repeated; order matters.
    #[clap(short = 'l', long = "language", value_name = "LANG")]
    pub languages: Vec<String>,

    /// Overwrite each source file instead of writing a copy.
    #[clap(long)]
    pub in_place: bool,

    /// Folder for output files. Defaults to the downloads folder.
    #[clap(long, value_name = "DIR")]
    pub output_folder: Option<PathBuf>,

    /// Produce plain PDF output instead of PDF/A.
    #[clap(long)]
    pub no_pdfa: bool,

    /// Do not auto-rotate pages.
    #[clap(long)]
    pub no_rotate_pages: bool,

    /// Do not deskew pages.
    #[clap(long)]
    pub no_deskew: bool,

    /// Skip files that already have a text layer instead of re-OCRing them.
    #[clap(long)]
    pub no_force_ocr: bool,

    /// Do not clean scan artifacts before OCR.
    #[clap(long)]
    pub no_clean: bool,

    /// Compress the output PDF.
    #[clap(long)]
    pub compress: bool,

    /// Persist the effective settings for future runs.
    #[clap(long)]
    pub save_settings: bool,

    /// Do not echo the tool's output while it runs. The summary and any
    /// errors are still shown.
    #[clap(short = 'q', long)]
    pub quiet: bool,
}

impl RunOpts {
    /// Loaded settings with this invocation's overrides applied.
    fn effective_settings(&self) -> Settings {
        let mut settings = Settings::load(self.settings.as_deref());
        if !self.languages.is_empty() {
            settings.languages = crate::languages::LanguageSelection::new(self.languages.clone());
        }
        if self.in_place {
            settings.in_place = true;
        }
        if let Some(folder) = &self.output_folder {
            settings.output_folder = folder.to_string_lossy().into_owned();
        }
        if self.no_pdfa {
            settings.output_pdfa = false;
        }
        if self.no_rotate_pages {
            settings.rotate_pages = false;
        }
        if self.no_deskew {
            settings.deskew = false;
        }
        if self.no_force_ocr {
            settings.force_ocr = false;
        }
        if self.no_clean {
            settings.clean = false;
        }
        if self.compress {
            settings.compress_pdf = true;
        }
        settings
    }
}

/// The `run` subcommand.
///
/// Drives one batch over the given files. The batch itself tolerates
/// per-file failures; we report them at the end and exit non-zero if any
/// file failed, so scripts can tell a clean run from a partial one.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_run(ui: Ui, opts: &RunOpts) -> Result<()> {
    let settings = opts.effective_settings();
    debug!(?settings, "effective settings");
    if opts.save_settings {
        settings.save(opts.settings.as_deref())?;
    }

    let transcript = Arc::new(Transcript::new());
    let runner = ToolRunner::new(OCR_TOOL);
    // The process exits right after the summary, so there's no idle prompt
    // to return to; skip the visible-delay reset.
    let batch = BatchRunner::new(runner, settings, transcript.clone())
        .with_reset_delay(Duration::ZERO);

    // A first Ctrl-C lets the current file finish, then stops the batch at
    // the per-file boundary. Interrupting an in-place rewrite mid-run is
    // exactly what we don't want.
    let cancel = batch.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current file");
            cancel.cancel();
        }
    });

    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "📄",
            msg: "OCRing PDFs",
            done_msg: "OCRed PDFs",
        },
        opts.files.len() as u64,
    );

    let failed = batch
        .run(&opts.files, |event| match event {
            BatchEvent::FileStarted {
                number,
                total,
                source,
            } => {
                debug!(number, total, "starting file");
                let name = source
                    .file_name()
                    .unwrap_or(source.as_os_str())
                    .to_string_lossy()
                    .into_owned();
                pb.set_message(name);
            }
            BatchEvent::Output(chunk) => {
                if !opts.quiet {
                    ui.print_output(&chunk);
                }
            }
            BatchEvent::FileSucceeded { number, target } => {
                debug!(number, target = %target.display(), "file done");
                pb.inc(1);
            }
            BatchEvent::FileFailed { number, error } => {
                pb.inc(1);
                ui.display_message("❌", &format!("file {number}: {error}"));
            }
        })
        .await;
    pb.finish_using_style();

    // Show where the outputs went.
    {
        let state = batch.state();
        let state = state.lock().expect("lock poisoned");
        for target in state.recent_outputs.iter().rev() {
            ui.display_message("✅", &format!("wrote {}", target.display()));
        }
        debug!(
            status = %state.status,
            is_running = state.is_running,
            settings_locked = state.settings_locked,
            current = state.current_file,
            total = state.total_files,
            last_error = ?state.last_error,
            transcript_bytes = transcript.len(),
            "batch state at exit"
        );
    }

    let total = opts.files.len();
    if failed > 0 {
        // With --quiet the live log was suppressed, but a failure means the
        // user needs it after all.
        if opts.quiet && !transcript.is_empty() {
            ui.print_output(&transcript.snapshot());
        }
        Err(anyhow!("{failed} of {total} file(s) failed"))
    } else {
        ui.display_message("🏁", &format!("Completed {total} file(s)"));
        Ok(())
    }
}
