//! Persisted OCR preferences.
//!
//! The settings file is a flat JSON object. Every field has a default, so a
//! partial file loads fine, and a missing or unreadable file falls back to
//! the defaults with a warning instead of blocking the run.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::{languages::LanguageSelection, prelude::*};

/// User preferences for OCR runs.
///
/// The boolean toggles map one-for-one onto `ocrmypdf` flags, with two
/// exceptions: `output_pdfa` is inverted (the tool produces PDF/A unless
/// told otherwise) and `correct_page_rotation` is persisted but mapped to
/// no flag.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Produce PDF/A output (the tool default). When disabled we pass
    /// `--output-type pdf`.
    pub output_pdfa: bool,

    /// Overwrite each source file instead of writing a new one.
    pub in_place: bool,

    /// Not currently mapped to a command-line flag; page rotation is
    /// controlled by `rotate_pages`.
    pub correct_page_rotation: bool,

    /// Straighten skewed pages (`--deskew`).
    pub deskew: bool,

    /// Rotate pages based on detected text orientation (`--rotate-pages`).
    pub rotate_pages: bool,

    /// OCR even pages that already have a text layer (`--force-ocr`).
    pub force_ocr: bool,

    /// Remove scan artifacts before OCR (`--clean`).
    pub clean: bool,

    /// Compress the output (`--optimize 2`).
    pub compress_pdf: bool,

    /// Where output files go. Empty means the platform downloads folder.
    pub output_folder: String,

    /// Ordered Tesseract language codes.
    pub languages: LanguageSelection,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_pdfa: true,
            in_place: false,
            correct_page_rotation: true,
            deskew: true,
            rotate_pages: true,
            force_ocr: true,
            clean: true,
            compress_pdf: false,
            output_folder: String::new(),
            languages: LanguageSelection::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location when `path`
    /// is `None`.
    ///
    /// Decoding is fail-open: a missing file yields the defaults silently,
    /// and a file we cannot read or parse yields the defaults with a
    /// warning. A bad settings file should never block an OCR run.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Self::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "could not parse settings file, using defaults"
                    );
                    Self {
                        languages: LanguageSelection::fallback(),
                        ..Self::default()
                    }
                }
            },
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "could not read settings file, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Write settings to `path`, or to the default location when `path` is
    /// `None`, creating parent directories as needed.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(Self::default_path)
            .ok_or_else(|| anyhow!("no settings path available"))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create settings directory {}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(self).context("failed to serialize settings")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write settings to {}", path.display()))?;
        info!(path = %path.display(), "saved settings");
        Ok(())
    }

    /// The platform-specific default settings path.
    pub fn default_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("", "", "ocrmypdf-batch")?;
        Some(dirs.config_dir().join("settings.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_toggles() {
        let s = Settings::default();
        assert!(s.output_pdfa);
        assert!(!s.in_place);
        assert!(s.correct_page_rotation);
        assert!(s.deskew);
        assert!(s.rotate_pages);
        assert!(s.force_ocr);
        assert!(s.clean);
        assert!(!s.compress_pdf);
        assert_eq!(s.output_folder, "");
        assert_eq!(s.languages.joined(), "eng+deu");
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.compress_pdf = true;
        settings.output_folder = "/tmp/out".to_owned();
        settings.languages = LanguageSelection::new(["fra"]);
        settings.save(Some(&path)).unwrap();

        let loaded = Settings::load(Some(&path));
        assert_eq!(loaded, settings);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"inPlace": true}"#).unwrap();

        let loaded = Settings::load(Some(&path));
        assert!(loaded.in_place);
        assert!(loaded.output_pdfa);
        assert_eq!(loaded.languages.joined(), "eng+deu");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        assert_eq!(Settings::load(Some(&path)), Settings::default());
    }

    #[test]
    fn corrupt_file_falls_back_to_the_single_language_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json at all {").unwrap();

        let loaded = Settings::load(Some(&path));
        assert_eq!(loaded.languages.joined(), "eng");
        assert!(loaded.output_pdfa);
    }
}
