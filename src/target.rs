//! Resolving where the OCRed copy of a file goes.
//!
//! The rules are fixed: in-place runs write back to the source, everything
//! else goes to the configured output folder, falling back to the platform
//! downloads folder and finally to the source file's own directory. The
//! resolver never fails to produce a path, and it performs no collision
//! handling; rerunning the same file with the same settings overwrites the
//! previous output.

use std::ffi::OsString;

use directories::UserDirs;

use crate::prelude::*;

/// Suffix inserted before the extension, so `report.pdf` becomes
/// `report ocr.pdf`. The leading space is part of the naming convention.
const OUTPUT_SUFFIX: &str = " ocr";

/// Compute the target path for one source file.
pub fn resolve_target(source: &Path, in_place: bool, output_folder: &str) -> PathBuf {
    if in_place {
        return source.to_path_buf();
    }

    let dir = if output_folder.is_empty() {
        default_output_dir(source)
    } else {
        PathBuf::from(output_folder)
    };

    dir.join(output_file_name(source))
}

/// `<stem> ocr.<extension>`, keeping the path filesystem-native. A source
/// without an extension gets no extension on the output either.
fn output_file_name(source: &Path) -> OsString {
    let mut name = source.file_stem().unwrap_or_default().to_os_string();
    name.push(OUTPUT_SUFFIX);
    if let Some(ext) = source.extension() {
        name.push(".");
        name.push(ext);
    }
    name
}

/// The downloads folder, or the source's own directory when the platform
/// has no downloads folder configured.
fn default_output_dir(source: &Path) -> PathBuf {
    downloads_dir()
        .or_else(|| source.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// The platform downloads folder, if there is one.
pub fn downloads_dir() -> Option<PathBuf> {
    UserDirs::new()?.download_dir().map(Path::to_path_buf)
}
