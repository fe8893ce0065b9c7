//! OCR language selection.
//!
//! `ocrmypdf` takes a `-l` flag whose value is one or more Tesseract
//! language codes joined with `+` (for example `eng+deu`). The selection
//! here is an ordered list of codes, persisted in the settings file.
//!
//! The joined value ends up on a command line, so before it may be emitted
//! it must match a safe character class (letters, digits, `+`). A selection
//! that fails the check is dropped rather than reported: the tool's own
//! default language applies, and the run is not blocked.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Language packs we know display names for, code first. `ocrmypdf` accepts
/// any installed Tesseract pack; this table only drives the `languages`
/// listing.
pub static KNOWN_LANGUAGES: &[(&str, &str)] = &[
    ("chi_sim", "Chinese (Simplified)"),
    ("chi_tra", "Chinese (Traditional/Cantonese)"),
    ("nld", "Dutch"),
    ("eng", "English"),
    ("fra", "French"),
    ("deu", "German"),
    ("pol", "Polish"),
    ("por", "Portuguese"),
];

/// The language we fall back to when a persisted selection cannot be
/// decoded.
pub static FALLBACK_LANGUAGE: &str = "eng";

/// Characters allowed in a `-l` value. Everything else keeps the value off
/// the command line entirely.
static SAFE_LANGUAGE_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+]+$").expect("failed to compile regex"));

/// An ordered selection of language codes.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LanguageSelection {
    codes: Vec<String>,
}

impl Default for LanguageSelection {
    fn default() -> Self {
        Self {
            codes: vec!["eng".to_owned(), "deu".to_owned()],
        }
    }
}

impl LanguageSelection {
    /// Create a selection from a list of codes, in order.
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    /// The selection used when a persisted value cannot be decoded.
    pub fn fallback() -> Self {
        Self::new([FALLBACK_LANGUAGE])
    }

    /// Is the selection empty?
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// The selected codes, in order.
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// Is this code part of the selection?
    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    /// The `+`-joined form `ocrmypdf` expects as the `-l` value.
    pub fn joined(&self) -> String {
        self.codes.join("+")
    }

    /// The validated `-l` value, or `None` if the selection is empty or
    /// contains unsafe characters. `None` means "emit no flag at all".
    pub fn command_value(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let joined = self.joined();
        if SAFE_LANGUAGE_VALUE.is_match(&joined) {
            Some(joined)
        } else {
            warn_rejected(&joined);
            None
        }
    }
}

fn warn_rejected(joined: &str) {
    tracing::warn!(
        value = %joined,
        "language selection contains unsafe characters, omitting -l flag"
    );
}
