//! The `doctor` subcommand.

use clap::Args;

use crate::{
    prelude::*,
    runner::{OCR_TOOL, ToolRunner},
    ui::{ProgressConfig, Ui},
};

/// `doctor` command-line arguments.
#[derive(Debug, Args)]
pub struct DoctorOpts {
    /// Only check that the tool resolves; skip running `--version`.
    #[clap(long)]
    pub probe_only: bool,
}

/// The `doctor` subcommand.
///
/// Runs the same existence probe that every OCR run performs, against the
/// same constructed search path, and reports what it finds. This is the
/// first thing to try when runs fail with "not found": the search path
/// printed here is exactly what the tool will be resolved against.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_doctor(ui: Ui, opts: &DoctorOpts) -> Result<()> {
    let runner = ToolRunner::new(OCR_TOOL);
    ui.display_message(
        "🔍",
        &format!(
            "searching for `{}` on: {}",
            runner.tool(),
            runner.search_path().to_string_lossy()
        ),
    );

    let sp = ui.new_spinner(&ProgressConfig {
        emoji: "🩺",
        msg: "checking ocrmypdf",
        done_msg: "checked ocrmypdf",
    });

    let path = match runner.locate().await {
        Ok(path) => path,
        Err(err) => {
            sp.finish_and_clear();
            ui.display_message("❌", &err.to_string());
            return Err(err.into());
        }
    };
    ui.display_message("✅", &format!("found {}", path.display()));

    if !opts.probe_only {
        // Report the tool's own version through the same streaming runner
        // the real OCR runs use.
        let outcome = runner
            .run(&["--version".into()], |chunk| ui.print_output(chunk))
            .await
            .context("tool resolved but failed to report its version")?;
        debug!(exit_code = outcome.exit_code, "version check finished");
    }
    sp.finish_using_style();

    Ok(())
}
