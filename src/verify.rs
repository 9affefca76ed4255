//! Config checking by asking frpc itself (`frpc verify -c <file>`).
//!
//! frpc ships a conformant TOML/INI/YAML parser, so nothing here tries to
//! understand the file format.

use std::path::Path;

use log::{info, warn};

use crate::error::{Error, Result};
use crate::service::runner::{CommandRunner, run_checked};

/// Verify `config_path` with the given frpc binary.
///
/// On success returns frpc's own confirmation line.
pub fn verify_config(
    runner: &dyn CommandRunner,
    binary: &Path,
    config_path: &Path,
) -> Result<String> {
    if !config_path.is_file() {
        warn!("frpc config file not found: {}", config_path.display());
        return Err(Error::ConfigNotFound(config_path.to_path_buf()));
    }

    let binary = binary.to_string_lossy();
    let config = config_path.to_string_lossy();
    let out = run_checked(runner, &binary, &["verify", "-c", &config])?;
    let message = out
        .stdout
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("syntax is ok")
        .to_string();
    info!("{}: {}", config_path.display(), message);
    Ok(message)
}
