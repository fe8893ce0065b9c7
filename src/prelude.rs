//! Imports used by almost every module in this crate.

pub use std::path::{Path, PathBuf};

pub use anyhow::{Context as _, Result, anyhow};
#[allow(unused_imports)]
pub use tracing::{debug, error, info, instrument, trace, warn};
