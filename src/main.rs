use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod args;
mod batch;
mod cmd;
mod error;
mod languages;
mod prelude;
mod runner;
mod settings;
mod target;
mod transcript;
mod ui;

/// Batch-run `ocrmypdf` over PDF files.
#[derive(Debug, Parser)]
#[clap(
    version,
    after_help = r#"
Environment Variables:
  - RUST_LOG (optional): Override the log filter, e.g. `RUST_LOG=debug`.

  `ocrmypdf` itself is found via the PATH, extended with the usual package
  manager install locations. Run the `doctor` subcommand to see the exact
  search path.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// OCR one or more PDF files sequentially.
    Run(cmd::run::RunOpts),
    /// Check that the OCR tool can be found and report its version.
    Doctor(cmd::doctor::DoctorOpts),
    /// List known OCR language packs and the current selection.
    Languages(cmd::languages::LanguagesOpts),
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Run(opts) => {
            cmd::run::cmd_run(ui, opts).await?;
        }
        Cmd::Doctor(opts) => {
            cmd::doctor::cmd_doctor(ui, opts).await?;
        }
        Cmd::Languages(opts) => {
            cmd::languages::cmd_languages(opts).await?;
        }
    }
    Ok(())
}
