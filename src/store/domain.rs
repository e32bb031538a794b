//! Hosts-file domain mappings

use std::ffi::OsString;
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use super::{read_text, resolve_link, split_lines, terminate, write_atomic, Line, LineEnding};
use crate::error::{PlakError, Result};
use crate::ssh::{run_checked, ProcessRunner};

/// One IP-to-hostname mapping; a hosts line with aliases yields several
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainEntry {
    pub ip: String,
    pub hostname: String,
}

impl DomainEntry {
    pub fn new(ip: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            hostname: hostname.into(),
        }
    }
}

/// Accepts IPv4/IPv6 literals, including scoped IPv6 such as `fe80::1%lo0`
pub fn is_ip_literal(text: &str) -> bool {
    let addr = match text.split_once('%') {
        Some((addr, zone)) if !zone.is_empty() => addr,
        Some(_) => return false,
        None => text,
    };
    match addr.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => addr == text,
        Ok(IpAddr::V6(_)) => true,
        Err(_) => false,
    }
}

/// A hostname token and the whitespace in front of it
#[derive(Debug, Clone)]
struct Alias {
    gap: String,
    name: String,
}

/// A recognized `<ip> <alias>...` line
#[derive(Debug, Clone)]
struct Mapping {
    line: Line,
    ip: String,
    /// Indentation and the IP
    lead: String,
    aliases: Vec<Alias>,
    /// Whitespace and inline comment after the last alias
    trailer: String,
}

/// Split into `(leading whitespace, token)` pairs
fn tokens(text: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(|c: char| !c.is_whitespace()) {
        let end = rest[start..]
            .find(char::is_whitespace)
            .map_or(rest.len(), |i| start + i);
        out.push((&rest[..start], &rest[start..end]));
        rest = &rest[end..];
    }
    out
}

impl Mapping {
    fn parse(line: &Line) -> Option<Self> {
        let text = line.text.as_str();
        let body = text.find('#').map_or(text, |i| &text[..i]);
        let content = body.trim_end();
        let trailer = &text[content.len()..];

        let mut parts = tokens(content).into_iter();
        let (indent, ip) = parts.next()?;
        if !is_ip_literal(ip) {
            return None;
        }
        let aliases: Vec<Alias> = parts
            .map(|(gap, name)| Alias {
                gap: gap.to_string(),
                name: name.to_string(),
            })
            .collect();
        if aliases.is_empty() {
            return None;
        }

        Some(Self {
            line: line.clone(),
            ip: ip.to_string(),
            lead: format!("{indent}{ip}"),
            aliases,
            trailer: trailer.to_string(),
        })
    }

    fn position(&self, ip: &str, hostname: &str) -> Option<usize> {
        if self.ip != ip {
            return None;
        }
        self.aliases.iter().position(|alias| alias.name == hostname)
    }

    /// Drop one alias, keeping the spacing of the others. The first alias
    /// hands its gap on so the column after the IP stays put.
    fn remove_alias(&mut self, index: usize) {
        let removed = self.aliases.remove(index);
        if index == 0 {
            if let Some(next) = self.aliases.first_mut() {
                next.gap = removed.gap;
            }
        }

        let mut text = self.lead.clone();
        for alias in &self.aliases {
            text.push_str(&alias.gap);
            text.push_str(&alias.name);
        }
        text.push_str(&self.trailer);
        self.line.text = text;
    }
}

#[derive(Debug, Clone)]
enum HostsLine {
    Passthrough(Line),
    Mapping(Mapping),
}

impl HostsLine {
    fn line(&self) -> &Line {
        match self {
            HostsLine::Passthrough(line) => line,
            HostsLine::Mapping(mapping) => &mapping.line,
        }
    }

    fn line_mut(&mut self) -> &mut Line {
        match self {
            HostsLine::Passthrough(line) => line,
            HostsLine::Mapping(mapping) => &mut mapping.line,
        }
    }
}

/// In-memory model of a hosts file
#[derive(Debug, Clone, Default)]
pub struct HostsFile {
    lines: Vec<HostsLine>,
    line_ending: LineEnding,
}

impl HostsFile {
    pub fn parse(content: &str) -> Self {
        let lines = split_lines(content)
            .map(|line| match Mapping::parse(&line) {
                Some(mapping) => HostsLine::Mapping(mapping),
                None => HostsLine::Passthrough(line),
            })
            .collect();

        Self {
            lines,
            line_ending: LineEnding::detect(content),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            line.line().render_into(&mut out);
        }
        out
    }

    /// Entries in file order, then alias order within a line
    pub fn entries(&self) -> Vec<DomainEntry> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                HostsLine::Mapping(mapping) => Some(mapping),
                HostsLine::Passthrough(_) => None,
            })
            .flat_map(|mapping| {
                mapping
                    .aliases
                    .iter()
                    .map(|alias| DomainEntry::new(&mapping.ip, &alias.name))
            })
            .collect()
    }

    /// Append `<ip> <hostname>` as a new line. Duplicates are allowed.
    pub fn add(&mut self, ip: &str, hostname: &str) -> Result<()> {
        if !is_ip_literal(ip) {
            return Err(PlakError::InvalidAddress(ip.to_string()));
        }
        if hostname.is_empty() || hostname.contains(char::is_whitespace) || hostname.contains('#') {
            return Err(PlakError::InvalidEntry(format!(
                "hostname '{hostname}' must be a single word"
            )));
        }

        terminate(self.lines.last_mut().map(HostsLine::line_mut), self.line_ending);

        let line = Line::new(format!("{ip} {hostname}"), self.line_ending.as_str());
        let mapping = Mapping::parse(&line).ok_or_else(|| {
            PlakError::InvalidEntry(format!("'{ip} {hostname}' is not a hosts mapping"))
        })?;
        self.lines.push(HostsLine::Mapping(mapping));
        Ok(())
    }

    /// Remove `hostname` from the first line mapping it to `ip`. The line
    /// goes away with its last alias.
    pub fn remove(&mut self, ip: &str, hostname: &str) -> Result<()> {
        let found = self.lines.iter().enumerate().find_map(|(i, line)| match line {
            HostsLine::Mapping(mapping) => mapping.position(ip, hostname).map(|pos| (i, pos)),
            HostsLine::Passthrough(_) => None,
        });

        let Some((index, alias)) = found else {
            return Err(PlakError::NotFound {
                what: "domain",
                key: format!("{ip} {hostname}"),
            });
        };

        match &mut self.lines[index] {
            HostsLine::Mapping(mapping) if mapping.aliases.len() > 1 => mapping.remove_alias(alias),
            _ => {
                self.lines.remove(index);
            }
        }
        Ok(())
    }
}

/// Domain mappings stored in the system hosts file
pub struct DomainStore {
    path: PathBuf,
    elevation: Option<Box<dyn ProcessRunner>>,
}

impl std::fmt::Debug for DomainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainStore")
            .field("path", &self.path)
            .field("elevation", &self.elevation.is_some())
            .finish()
    }
}

impl DomainStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            elevation: None,
        }
    }

    /// Retry writes that fail for lack of privilege through `sudo`
    pub fn with_elevation(mut self, runner: Box<dyn ProcessRunner>) -> Self {
        self.elevation = Some(runner);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<HostsFile> {
        Ok(read_text(&self.path)?
            .map(|content| HostsFile::parse(&content))
            .unwrap_or_default())
    }

    pub fn save(&self, hosts: &HostsFile) -> Result<()> {
        let content = hosts.render();
        let target = resolve_link(&self.path)?;
        match (write_atomic(&target, &content, 0o644), &self.elevation) {
            (Err(PlakError::Permission { .. }), Some(runner)) => {
                warn!(path = %target.display(), "hosts file not writable, elevating");
                install_elevated(runner.as_ref(), &content, &target)
            }
            (result, _) => result,
        }
    }

    pub fn list(&self) -> Result<Vec<DomainEntry>> {
        Ok(self.load()?.entries())
    }

    pub fn create(&self, ip: &str, hostname: &str) -> Result<()> {
        let mut hosts = self.load()?;
        hosts.add(ip, hostname)?;
        self.save(&hosts)?;

        info!(ip, hostname, path = %self.path.display(), "domain added");
        Ok(())
    }

    pub fn delete(&self, ip: &str, hostname: &str) -> Result<()> {
        let mut hosts = self.load()?;
        hosts.remove(ip, hostname)?;
        self.save(&hosts)?;

        info!(ip, hostname, path = %self.path.display(), "domain removed");
        Ok(())
    }
}

/// Stage `content` in a temp file, then `sudo install` it next to `target`
/// and `sudo mv` it over the target so the replace stays atomic.
pub fn install_elevated(runner: &dyn ProcessRunner, content: &str, target: &Path) -> Result<()> {
    let mut staged = NamedTempFile::new()?;
    staged.write_all(content.as_bytes())?;
    staged.as_file().sync_all()?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hosts".to_string());
    let sibling = target.with_file_name(format!(".{file_name}.plak-tmp"));

    let permission = |_| PlakError::Permission {
        path: target.to_path_buf(),
    };

    let install: Vec<OsString> = vec![
        "install".into(),
        "-m".into(),
        "644".into(),
        staged.path().into(),
        sibling.clone().into(),
    ];
    run_checked(runner, "sudo", &install).map_err(permission)?;

    let rename: Vec<OsString> = vec!["mv".into(), "-f".into(), sibling.into(), target.into()];
    run_checked(runner, "sudo", &rename).map_err(permission)?;

    Ok(())
}
