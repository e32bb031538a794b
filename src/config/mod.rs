//! Configuration: where the SSH config, hosts file and keys live
//!
//! Each location comes from, in order:
//! - a command-line option (`--ssh-config`, `--hosts-file`, `--key-dir`)
//! - an environment variable (`PLAK_SSH_CONFIG`, `PLAK_HOSTS_FILE`, `PLAK_KEY_DIR`)
//! - the platform default

mod paths;

pub use paths::{default_hosts_path, default_ssh_dir, Paths};
