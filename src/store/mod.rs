//! Record stores backed by plain-text system files
//!
//! Every store follows the same cycle:
//! - load the whole backing file into an ordered list of records
//! - apply one mutation in memory
//! - render the full list and replace the file atomically
//!
//! Lines a store does not understand are kept as raw text and written back
//! unchanged, including their line terminators.

mod domain;
mod key;
mod server;

pub use domain::{DomainEntry, DomainStore, HostsFile};
pub use key::{KeyDetails, KeyPair, KeyStore};
pub use server::{ServerEntry, ServerStore, SshConfigFile, DEFAULT_PORT};

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{PlakError, Result};

/// Line terminator style used for lines the tool appends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// Pick the style of the first terminated line, `Lf` for empty content
    pub fn detect(content: &str) -> Self {
        match content.find('\n') {
            Some(i) if content[..i].ends_with('\r') => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// One physical line: its text and the terminator that followed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Line {
    pub text: String,
    pub eol: &'static str,
}

impl Line {
    pub fn new(text: impl Into<String>, eol: &'static str) -> Self {
        Self {
            text: text.into(),
            eol,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn render_into(&self, out: &mut String) {
        out.push_str(&self.text);
        out.push_str(self.eol);
    }
}

/// Split content into lines, keeping each terminator. The last line has an
/// empty terminator when the content does not end with a newline.
pub(crate) fn split_lines(content: &str) -> impl Iterator<Item = Line> + '_ {
    content.split_inclusive('\n').map(|raw| {
        if let Some(text) = raw.strip_suffix("\r\n") {
            Line::new(text, "\r\n")
        } else if let Some(text) = raw.strip_suffix('\n') {
            Line::new(text, "\n")
        } else {
            Line::new(raw, "")
        }
    })
}

/// Make sure an appended line starts on its own line
pub(crate) fn terminate(last: Option<&mut Line>, ending: LineEnding) {
    if let Some(line) = last {
        if line.eol.is_empty() {
            line.eol = ending.as_str();
        }
    }
}

/// Read a backing file as text. A missing file reads as `None`.
pub(crate) fn read_text(path: &Path) -> Result<Option<String>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "backing file does not exist yet");
            return Ok(None);
        }
        Err(e) => return Err(PlakError::from_io(path, e)),
    };

    if bytes.contains(&0) {
        return Err(PlakError::MalformedFile {
            path: path.to_path_buf(),
            reason: "contains NUL bytes",
        });
    }

    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| PlakError::MalformedFile {
            path: path.to_path_buf(),
            reason: "not valid UTF-8",
        })
}

/// The file a write to `path` should replace: the target of a symlink,
/// otherwise `path` itself
pub(crate) fn resolve_link(path: &Path) -> Result<PathBuf> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = fs::canonicalize(path).map_err(|e| PlakError::from_io(path, e))?;
            debug!(link = %path.display(), target = %target.display(), "writing through symlink");
            Ok(target)
        }
        _ => Ok(path.to_path_buf()),
    }
}

/// Replace `path` with `content` through a temporary file in the same
/// directory. A symlink is followed and its target replaced. The existing
/// file's permissions carry over; a new file gets `new_mode` on Unix.
pub(crate) fn write_atomic(path: &Path, content: &str, new_mode: u32) -> Result<()> {
    let path = resolve_link(path)?;
    let path = path.as_path();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PlakError::from_io(path, e))?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;

    match fs::metadata(path) {
        Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
        Err(_) => set_mode(tmp.as_file(), new_mode)?,
    }

    tmp.persist(path)
        .map_err(|e| PlakError::from_io(path, e.error))?;

    debug!(path = %path.display(), bytes = content.len(), "file replaced");
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &fs::File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _mode: u32) -> io::Result<()> {
    Ok(())
}
