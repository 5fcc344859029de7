//! Settings file

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use gps_ctl::Context;

/// Default location: `<config dir>/gpsctl/settings.json`
pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gpsctl").join("settings.json"))
}

/// Load settings from `explicit`, or from the default location if a file is
/// there. With neither, the built-in defaults apply.
pub fn load(explicit: Option<&Path>) -> Result<Context> {
    if let Some(path) = explicit {
        return read(path);
    }
    match settings_path() {
        Some(path) if path.is_file() => read(&path),
        _ => Ok(Context::default()),
    }
}

fn read(path: &Path) -> Result<Context> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read settings at {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse settings at {}", path.display()))
}
