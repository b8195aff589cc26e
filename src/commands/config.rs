use log::info;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ProbeError, Result};
use crate::settings::ProbeSettings;

/// Renders the effective configuration as TOML.
///
/// # Arguments
///
/// * `path` - Explicit configuration file; the default location is used
///   when absent and built-in defaults when that does not exist either
pub fn show_config(path: Option<&Path>) -> Result<String> {
    let settings = ProbeSettings::load_or_default(path)?;
    settings.to_toml()
}

/// Writes a commented default configuration file.
///
/// # Arguments
///
/// * `path` - Target file; defaults to `<config dir>/cipherprobe/probe.toml`
/// * `force` - Overwrite an existing file
///
/// # Returns
///
/// * `Ok(PathBuf)` - The file that was written
/// * `Err(ProbeError::Io)` - If the file exists and `force` is not set, or
///   no config directory is known for this platform
pub fn init_config(path: Option<PathBuf>, force: bool) -> Result<PathBuf> {
    let path = match path.or_else(ProbeSettings::default_config_path) {
        Some(path) => path,
        None => {
            return Err(ProbeError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no configuration directory on this platform, pass a path",
            )))
        }
    };

    if path.exists() && !force {
        return Err(ProbeError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists, use --force to overwrite", path.display()),
        )));
    }

    ProbeSettings::create_default_config_file(&path)?;
    info!("Configuration written to {}", path.display());
    Ok(path)
}
