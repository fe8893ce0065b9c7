//! The `languages` subcommand.

use clap::Args;

use crate::{languages::KNOWN_LANGUAGES, prelude::*, settings::Settings};

/// `languages` command-line arguments.
#[derive(Debug, Args)]
pub struct LanguagesOpts {
    /// Settings file to read the current selection from.
    #[clap(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,
}

/// The `languages` subcommand.
///
/// Prints the known language packs and marks the currently selected ones.
/// `ocrmypdf` accepts any installed Tesseract pack, so codes outside this
/// table work too; pass them with `run -l`.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_languages(opts: &LanguagesOpts) -> Result<()> {
    let settings = Settings::load(opts.settings.as_deref());
    for (code, name) in KNOWN_LANGUAGES {
        let marker = if settings.languages.contains(code) {
            "*"
        } else {
            " "
        };
        println!("{marker} {code:8} {name}");
    }
    // Selected codes outside the table still work, as long as the matching
    // Tesseract pack is installed.
    for code in settings.languages.codes() {
        if !KNOWN_LANGUAGES.iter().any(|(known, _)| *known == code.as_str()) {
            println!("* {code:8} (no built-in description)");
        }
    }
    println!();
    println!("* = selected (current selection: {})", settings.languages.joined());
    Ok(())
}
