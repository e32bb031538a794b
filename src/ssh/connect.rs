//! Interactive `ssh` sessions for configured servers

use std::ffi::OsString;

use tracing::info;

use super::ProcessRunner;
use crate::error::{PlakError, Result};
use crate::store::{ServerEntry, DEFAULT_PORT};

pub const SSH: &str = "ssh";

/// Arguments for `ssh`: `[-p port] [-i identity] [user@]host`
pub fn connect_args(server: &ServerEntry) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    if server.port != DEFAULT_PORT {
        args.push("-p".into());
        args.push(server.port.to_string().into());
    }
    if let Some(identity) = &server.identity_file {
        args.push("-i".into());
        args.push(expand_home(identity).into());
    }
    let target = match &server.user {
        Some(user) => format!("{}@{}", user, server.target_host()),
        None => server.target_host().to_string(),
    };
    args.push(target.into());
    args
}

/// `ssh` does not expand `~` in `-i`, so do it here
fn expand_home(path: &str) -> OsString {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).into_os_string(),
        _ => path.into(),
    }
}

/// Open an interactive session; blocks until `ssh` exits
pub fn connect(runner: &dyn ProcessRunner, server: &ServerEntry) -> Result<()> {
    info!(server = %server.name, target = %server.connection_string(), "connecting");

    let status = runner.interactive(SSH, &connect_args(server))?;
    if status.success {
        Ok(())
    } else {
        Err(PlakError::Process {
            program: SSH.to_string(),
            message: status.describe(),
        })
    }
}
