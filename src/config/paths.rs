//! Locations of the files plak manages

use std::path::PathBuf;

use tracing::debug;

use crate::error::{PlakError, Result};

const SSH_DIR: &str = ".ssh";
const SSH_CONFIG_FILE: &str = "config";

#[cfg(windows)]
const HOSTS_FILE: &str = r"C:\Windows\System32\drivers\etc\hosts";
#[cfg(not(windows))]
const HOSTS_FILE: &str = "/etc/hosts";

/// Resolved backing locations for the three stores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub ssh_config: PathBuf,
    pub hosts_file: PathBuf,
    pub key_dir: PathBuf,
}

impl Paths {
    /// Fill in the platform defaults for every location not given.
    /// The home directory is only required when a default needs it.
    pub fn resolve(
        ssh_config: Option<PathBuf>,
        hosts_file: Option<PathBuf>,
        key_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let ssh_config = match ssh_config {
            Some(path) => path,
            None => default_ssh_dir()?.join(SSH_CONFIG_FILE),
        };
        let key_dir = match key_dir {
            Some(path) => path,
            None => default_ssh_dir()?,
        };
        let hosts_file = hosts_file.unwrap_or_else(default_hosts_path);

        let paths = Self {
            ssh_config,
            hosts_file,
            key_dir,
        };
        debug!(?paths, "paths resolved");
        Ok(paths)
    }
}

/// `~/.ssh`
pub fn default_ssh_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(SSH_DIR))
        .ok_or(PlakError::NoHomeDir)
}

/// The platform's hosts file
pub fn default_hosts_path() -> PathBuf {
    PathBuf::from(HOSTS_FILE)
}
