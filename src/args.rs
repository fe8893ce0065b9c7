//! Building the `ocrmypdf` argument vector.
//!
//! This is a pure mapping from settings plus a source/target pair to an
//! ordered list of argument tokens. Each argument stays a discrete token
//! all the way into `Command::arg`, so no user-controlled string is ever
//! interpolated into a shell-interpreted string. Paths are passed in their
//! filesystem-native form.

use std::ffi::OsString;

use crate::{prelude::*, settings::Settings};

/// Build the argument vector for one OCR run.
///
/// Never fails: an invalid language selection drops the `-l` flag instead
/// of erroring, and every other flag is an independent boolean. The source
/// and target paths are always the final two positional arguments.
pub fn ocr_args(settings: &Settings, source: &Path, target: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();

    if let Some(languages) = settings.languages.command_value() {
        args.push("-l".into());
        args.push(languages.into());
    }

    // PDF/A is the tool's default output type; only plain PDF needs a flag.
    if !settings.output_pdfa {
        args.push("--output-type".into());
        args.push("pdf".into());
    }

    if settings.rotate_pages {
        args.push("--rotate-pages".into());
    }
    if settings.deskew {
        args.push("--deskew".into());
    }
    if settings.force_ocr {
        args.push("--force-ocr".into());
    }
    if settings.clean {
        args.push("--clean".into());
    }

    if settings.compress_pdf {
        args.push("--optimize".into());
        args.push("2".into());
    }

    args.push(source.as_os_str().to_owned());
    args.push(target.as_os_str().to_owned());

    args
}

/// Render an argument vector for display in the log. Lossy, for humans
/// only; execution always uses the original tokens.
pub fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
