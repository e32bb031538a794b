//! SSH client config (`Host` stanzas)

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{read_text, split_lines, terminate, write_atomic, Line, LineEnding};
use crate::error::{PlakError, Result};

/// Port used when a stanza has no `Port` line
pub const DEFAULT_PORT: u16 = 22;

const INDENT: &str = "    ";

/// A server profile, one `Host` stanza
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerEntry {
    /// Alias from the `Host` line (e.g., "web", "backup")
    pub name: String,
    /// `HostName`: address or DNS name, empty when the stanza has none
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
}

impl ServerEntry {
    pub fn new(name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            user: None,
            port: DEFAULT_PORT,
            identity_file: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_identity_file(mut self, identity_file: impl Into<String>) -> Self {
        self.identity_file = Some(identity_file.into());
        self
    }

    /// Address to connect to; ssh falls back to the alias without `HostName`
    pub fn target_host(&self) -> &str {
        if self.hostname.is_empty() {
            &self.name
        } else {
            &self.hostname
        }
    }

    /// Get the SSH connection string (user@host:port)
    pub fn connection_string(&self) -> String {
        let host = match &self.user {
            Some(user) => format!("{}@{}", user, self.target_host()),
            None => self.target_host().to_string(),
        };
        if self.port == DEFAULT_PORT {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains(char::is_whitespace) || self.name.contains('#') {
            return Err(PlakError::InvalidEntry(format!(
                "server name '{}' must be a single word",
                self.name
            )));
        }
        if self.hostname.is_empty() || self.hostname.contains(char::is_whitespace) {
            return Err(PlakError::InvalidEntry(format!(
                "hostname '{}' must be a single word",
                self.hostname
            )));
        }
        if let Some(user) = &self.user {
            if user.is_empty() || user.contains(char::is_whitespace) {
                return Err(PlakError::InvalidEntry(format!("user '{user}' must be a single word")));
            }
        }
        if let Some(identity) = &self.identity_file {
            if identity.trim().is_empty() || identity.contains(['\r', '\n', '"']) {
                return Err(PlakError::InvalidEntry(format!(
                    "identity file '{identity}' is not a usable path"
                )));
            }
        }
        Ok(())
    }

    /// Canonical sub-lines for a new stanza
    fn directives(&self) -> Vec<(Field, String)> {
        let mut out = vec![(Field::HostName, self.hostname.clone())];
        if let Some(user) = &self.user {
            out.push((Field::User, user.clone()));
        }
        out.push((Field::Port, self.port.to_string()));
        if let Some(identity) = &self.identity_file {
            out.push((Field::IdentityFile, quote(identity)));
        }
        out
    }
}

/// Sub-fields the tool understands; everything else stays opaque
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    HostName,
    User,
    Port,
    IdentityFile,
}

impl Field {
    fn parse(keyword: &str) -> Option<Self> {
        [Field::HostName, Field::User, Field::Port, Field::IdentityFile]
            .into_iter()
            .find(|field| field.keyword().eq_ignore_ascii_case(keyword))
    }

    fn keyword(self) -> &'static str {
        match self {
            Field::HostName => "HostName",
            Field::User => "User",
            Field::Port => "Port",
            Field::IdentityFile => "IdentityFile",
        }
    }
}

/// Split `Keyword value`, `Keyword=value` or `Keyword = value`
fn split_directive(text: &str) -> Option<(&str, &str)> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let end = trimmed
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(trimmed.len());
    let (keyword, rest) = trimmed.split_at(end);
    let rest = rest.trim_start();
    let value = rest.strip_prefix('=').unwrap_or(rest).trim();
    Some((keyword, value))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn quote(value: &str) -> String {
    if value.contains(char::is_whitespace) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone)]
struct Stanza {
    entry: ServerEntry,
    header: Line,
    /// Every line after the header, recognized or not, in file order
    body: Vec<Line>,
}

impl Stanza {
    fn open(name: &str, header: Line) -> Self {
        Self {
            entry: ServerEntry::new(name, ""),
            header,
            body: Vec::new(),
        }
    }

    /// Attach a body line, extracting the value of a recognized field.
    /// The first occurrence of a field wins, as in ssh itself.
    fn absorb(&mut self, line: Line, seen: &mut Vec<Field>) {
        if let Some((keyword, value)) = split_directive(&line.text) {
            if let Some(field) = Field::parse(keyword) {
                if !seen.contains(&field) && self.apply(field, unquote(value)) {
                    seen.push(field);
                }
            }
        }
        self.body.push(line);
    }

    fn apply(&mut self, field: Field, value: &str) -> bool {
        match field {
            Field::HostName => self.entry.hostname = value.to_string(),
            Field::User => self.entry.user = Some(value.to_string()),
            Field::IdentityFile => self.entry.identity_file = Some(value.to_string()),
            Field::Port => match value.parse() {
                Ok(port) => self.entry.port = port,
                Err(_) => {
                    warn!(host = %self.entry.name, value, "ignoring unparsable Port");
                    return false;
                }
            },
        }
        true
    }

    fn last_line_mut(&mut self) -> &mut Line {
        self.body.last_mut().unwrap_or(&mut self.header)
    }
}

#[derive(Debug, Clone)]
enum Block {
    Passthrough(Line),
    Stanza(Stanza),
}

/// What a single line means to the parser
enum LineKind {
    HostStart(String),
    MatchStart,
    Other,
}

fn classify(text: &str) -> LineKind {
    match split_directive(text) {
        Some((keyword, value)) if keyword.eq_ignore_ascii_case("Host") => {
            LineKind::HostStart(value.to_string())
        }
        Some((keyword, _)) if keyword.eq_ignore_ascii_case("Match") => LineKind::MatchStart,
        _ => LineKind::Other,
    }
}

/// In-memory model of an SSH config file
#[derive(Debug, Clone, Default)]
pub struct SshConfigFile {
    blocks: Vec<Block>,
    line_ending: LineEnding,
}

impl SshConfigFile {
    pub fn parse(content: &str) -> Self {
        let mut blocks = Vec::new();
        let mut current: Option<(Stanza, Vec<Field>)> = None;

        for line in split_lines(content) {
            match classify(&line.text) {
                LineKind::HostStart(name) => {
                    if let Some((stanza, _)) = current.take() {
                        close_stanza(&mut blocks, stanza);
                    }
                    current = Some((Stanza::open(&name, line), Vec::new()));
                }
                LineKind::MatchStart => {
                    // A Match block is not a server profile; its lines pass through
                    if let Some((stanza, _)) = current.take() {
                        close_stanza(&mut blocks, stanza);
                    }
                    blocks.push(Block::Passthrough(line));
                }
                LineKind::Other => match current.as_mut() {
                    Some((stanza, seen)) => stanza.absorb(line, seen),
                    None => blocks.push(Block::Passthrough(line)),
                },
            }
        }
        if let Some((stanza, _)) = current {
            close_stanza(&mut blocks, stanza);
        }

        Self {
            blocks,
            line_ending: LineEnding::detect(content),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Passthrough(line) => line.render_into(&mut out),
                Block::Stanza(stanza) => {
                    stanza.header.render_into(&mut out);
                    for line in &stanza.body {
                        line.render_into(&mut out);
                    }
                }
            }
        }
        out
    }

    pub fn entries(&self) -> impl Iterator<Item = &ServerEntry> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Stanza(stanza) => Some(&stanza.entry),
            Block::Passthrough(_) => None,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ServerEntry> {
        self.entries().find(|entry| entry.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    /// Append a new stanza at the end of the file, after a blank separator
    /// when the file has content. Removing the last stanza takes one
    /// trailing blank line with it, so add then remove restores the file.
    pub fn add(&mut self, entry: ServerEntry) -> Result<()> {
        entry.validate()?;
        if self.get(&entry.name).is_some() {
            return Err(PlakError::DuplicateName {
                what: "server",
                name: entry.name,
            });
        }

        let ending = self.line_ending;
        let eol = ending.as_str();
        terminate(self.last_line_mut(), ending);
        if !self.blocks.is_empty() {
            self.blocks.push(Block::Passthrough(Line::new("", eol)));
        }

        let header = Line::new(format!("Host {}", entry.name), eol);
        let body = entry
            .directives()
            .into_iter()
            .map(|(field, value)| Line::new(format!("{INDENT}{} {value}", field.keyword()), eol))
            .collect();

        self.blocks.push(Block::Stanza(Stanza {
            entry,
            header,
            body,
        }));
        Ok(())
    }

    /// Remove every stanza named `name`, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.blocks.len();
        let was_last = matches!(self.blocks.last(), Some(Block::Stanza(s)) if s.entry.name == name);

        self.blocks
            .retain(|block| !matches!(block, Block::Stanza(s) if s.entry.name == name));
        let removed = before - self.blocks.len();

        // Drop the separator that was left dangling at the end of the file
        if removed > 0 && was_last {
            if let Some(last) = self.last_line_mut() {
                if last.is_blank() {
                    self.pop_last_line();
                }
            }
        }
        removed
    }

    fn last_line_mut(&mut self) -> Option<&mut Line> {
        self.blocks.last_mut().map(|block| match block {
            Block::Passthrough(line) => line,
            Block::Stanza(stanza) => stanza.last_line_mut(),
        })
    }

    fn pop_last_line(&mut self) {
        match self.blocks.last_mut() {
            Some(Block::Stanza(stanza)) if !stanza.body.is_empty() => {
                stanza.body.pop();
            }
            Some(Block::Passthrough(_)) => {
                self.blocks.pop();
            }
            _ => {}
        }
    }
}

/// Move unindented comments at the end of a stanza out of it. They usually
/// introduce the next stanza and must survive its predecessor's deletion.
fn close_stanza(blocks: &mut Vec<Block>, mut stanza: Stanza) {
    let keep = stanza
        .body
        .iter()
        .rposition(|line| !line.text.starts_with('#'))
        .map_or(0, |i| i + 1);
    let detached = stanza.body.split_off(keep);

    blocks.push(Block::Stanza(stanza));
    blocks.extend(detached.into_iter().map(Block::Passthrough));
}

/// Server profiles stored in an SSH client config file
#[derive(Debug, Clone)]
pub struct ServerStore {
    path: PathBuf,
}

impl ServerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config file; a missing file is an empty config
    pub fn load(&self) -> Result<SshConfigFile> {
        Ok(read_text(&self.path)?
            .map(|content| SshConfigFile::parse(&content))
            .unwrap_or_default())
    }

    pub fn save(&self, config: &SshConfigFile) -> Result<()> {
        ensure_private_dir(&self.path)?;
        write_atomic(&self.path, &config.render(), 0o600)
    }

    pub fn list(&self) -> Result<Vec<ServerEntry>> {
        Ok(self.load()?.entries().cloned().collect())
    }

    pub fn get(&self, name: &str) -> Result<ServerEntry> {
        self.load()?
            .get(name)
            .cloned()
            .ok_or_else(|| PlakError::NotFound {
                what: "server",
                key: name.to_string(),
            })
    }

    pub fn create(&self, entry: ServerEntry) -> Result<()> {
        let mut config = self.load()?;
        let name = entry.name.clone();
        config.add(entry)?;
        self.save(&config)?;

        info!(server = %name, path = %self.path.display(), "server added");
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let mut config = self.load()?;
        if config.remove(name) == 0 {
            return Err(PlakError::NotFound {
                what: "server",
                key: name.to_string(),
            });
        }
        self.save(&config)?;

        info!(server = %name, path = %self.path.display(), "server removed");
        Ok(())
    }
}

/// Create the config directory (`~/.ssh`) with owner-only access if missing
fn ensure_private_dir(path: &Path) -> Result<()> {
    let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return Ok(());
    };
    if dir.exists() {
        return Ok(());
    }

    debug!(dir = %dir.display(), "creating config directory");
    fs::create_dir_all(dir).map_err(|e| PlakError::from_io(dir, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# global defaults
Host *
    ServerAliveInterval 60

Host testserver1
    HostName 192.168.1.10
    User testuser
    Port 22

# production
Host testserver2
    HostName 10.0.0.1
    User admin
    Port 2222
    IdentityFile ~/.ssh/special_key
    ForwardAgent yes
";

    fn store_with(content: &str) -> (TempDir, ServerStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, content).unwrap();
        (dir, ServerStore::new(path))
    }

    fn read(store: &ServerStore) -> String {
        fs::read_to_string(store.path()).unwrap()
    }

    #[test]
    fn test_parse_entries() {
        let config = SshConfigFile::parse(SAMPLE);
        let entries: Vec<_> = config.entries().collect();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "*");
        assert_eq!(
            entries[1],
            &ServerEntry::new("testserver1", "192.168.1.10").with_user("testuser")
        );
        assert_eq!(
            entries[2],
            &ServerEntry::new("testserver2", "10.0.0.1")
                .with_user("admin")
                .with_port(2222)
                .with_identity_file("~/.ssh/special_key")
        );
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        for content in [
            SAMPLE,
            "",
            "Host a\n  HostName x",
            "Host a\r\n\tHostName x\r\n\r\n# trailing\r\n",
            "\n\n  # indented comment\nInclude ~/.ssh/conf.d/*\n",
            "Match host *.corp\n    User corp\nHost b\nHostName=y\n",
        ] {
            assert_eq!(SshConfigFile::parse(content).render(), content);
        }
    }

    #[test]
    fn test_keyword_forms() {
        let config = SshConfigFile::parse(
            "host one\n  hostname=1.1.1.1\n  PORT = 2200\n  identityfile \"/keys/my key\"\n",
        );
        let entry = config.get("one").unwrap();

        assert_eq!(entry.hostname, "1.1.1.1");
        assert_eq!(entry.port, 2200);
        assert_eq!(entry.identity_file.as_deref(), Some("/keys/my key"));
    }

    #[test]
    fn test_bare_host_line_has_defaults() {
        let config = SshConfigFile::parse("Host lonely\n");
        assert_eq!(config.get("lonely"), Some(&ServerEntry::new("lonely", "")));
    }

    #[test]
    fn test_unparsable_port_is_skipped() {
        let content = "Host a\n  Port ssh\n  Port 2022\n";
        let config = SshConfigFile::parse(content);

        assert_eq!(config.get("a").unwrap().port, 2022);
        assert_eq!(config.render(), content);
    }

    #[test]
    fn test_first_value_wins() {
        let config = SshConfigFile::parse("Host a\n  User first\n  User second\n");
        assert_eq!(config.get("a").unwrap().user.as_deref(), Some("first"));
    }

    #[test]
    fn test_match_block_is_not_an_entry() {
        let config = SshConfigFile::parse("Host a\n  User x\nMatch all\n  User y\n");
        assert_eq!(config.len(), 1);
        assert_eq!(config.get("a").unwrap().user.as_deref(), Some("x"));
    }

    #[test]
    fn test_list_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ServerStore::new(dir.path().join("config"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_create_then_list() {
        let (_dir, store) = store_with(SAMPLE);
        let entry = ServerEntry::new("web", "web.example.com")
            .with_user("deploy")
            .with_port(2200)
            .with_identity_file("~/.ssh/id_web");

        store.create(entry.clone()).unwrap();

        let entries = store.list().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries.iter().filter(|e| **e == entry).count(), 1);
        let before: Vec<ServerEntry> = SshConfigFile::parse(SAMPLE).entries().cloned().collect();
        assert_eq!(&entries[..3], &before[..]);

        let content = read(&store);
        assert!(content.starts_with(SAMPLE));
        assert!(content.ends_with(
            "\nHost web\n    HostName web.example.com\n    User deploy\n    Port 2200\n    IdentityFile ~/.ssh/id_web\n"
        ));
    }

    #[test]
    fn test_create_omits_absent_fields() {
        let dir = TempDir::new().unwrap();
        let store = ServerStore::new(dir.path().join(".ssh").join("config"));

        store.create(ServerEntry::new("box", "10.1.1.1")).unwrap();

        assert_eq!(read(&store), "Host box\n    HostName 10.1.1.1\n    Port 22\n");
    }

    #[test]
    fn test_create_terminates_last_line_and_keeps_crlf() {
        let (_dir, store) = store_with("Host a\r\n  HostName x");

        store.create(ServerEntry::new("b", "y")).unwrap();

        assert_eq!(
            read(&store),
            "Host a\r\n  HostName x\r\n\r\nHost b\r\n    HostName y\r\n    Port 22\r\n"
        );
    }

    #[test]
    fn test_duplicate_rejected_file_untouched() {
        let (_dir, store) = store_with(SAMPLE);

        let err = store
            .create(ServerEntry::new("testserver1", "1.2.3.4"))
            .unwrap_err();

        assert!(matches!(err, PlakError::DuplicateName { .. }));
        assert_eq!(read(&store), SAMPLE);
    }

    #[test]
    fn test_name_match_is_case_sensitive() {
        let (_dir, store) = store_with(SAMPLE);
        store.create(ServerEntry::new("TestServer1", "1.2.3.4")).unwrap();
        assert_eq!(store.list().unwrap().len(), 4);
    }

    #[test]
    fn test_invalid_entry_rejected() {
        let (_dir, store) = store_with(SAMPLE);

        for entry in [
            ServerEntry::new("two words", "h"),
            ServerEntry::new("", "h"),
            ServerEntry::new("n", ""),
            ServerEntry::new("n", "h").with_user("a b"),
        ] {
            assert!(matches!(store.create(entry), Err(PlakError::InvalidEntry(_))));
        }
        assert_eq!(read(&store), SAMPLE);
    }

    #[test]
    fn test_delete_then_list() {
        let (_dir, store) = store_with(SAMPLE);

        store.delete("testserver1").unwrap();

        let names: Vec<_> = store.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["*", "testserver2"]);
        assert_eq!(
            read(&store),
            "\
# global defaults
Host *
    ServerAliveInterval 60

# production
Host testserver2
    HostName 10.0.0.1
    User admin
    Port 2222
    IdentityFile ~/.ssh/special_key
    ForwardAgent yes
"
        );
    }

    #[test]
    fn test_delete_keeps_unrecognized_lines_of_others() {
        let (_dir, store) = store_with(SAMPLE);
        store.delete("*").unwrap();
        assert!(read(&store).contains("    ForwardAgent yes\n"));
        assert!(!read(&store).contains("ServerAliveInterval"));
    }

    #[test]
    fn test_delete_missing() {
        let (_dir, store) = store_with(SAMPLE);
        let err = store.delete("nope").unwrap_err();

        assert!(matches!(err, PlakError::NotFound { .. }));
        assert_eq!(read(&store), SAMPLE);
    }

    #[test]
    fn test_create_then_delete_restores_file() {
        let (_dir, store) = store_with(SAMPLE);

        store.create(ServerEntry::new("tmp", "127.0.0.1")).unwrap();
        store.delete("tmp").unwrap();

        assert_eq!(read(&store), SAMPLE);
    }

    #[test]
    fn test_create_then_delete_keeps_existing_blank_lines() {
        for content in ["Host a\n    HostName x\n\n", "\n", "# only a comment\n\n\n"] {
            let (_dir, store) = store_with(content);

            store.create(ServerEntry::new("b", "y")).unwrap();
            assert_eq!(store.get("b").unwrap().hostname, "y");
            store.delete("b").unwrap();

            assert_eq!(read(&store), content);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_config_is_edited_in_place() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("dotfiles_ssh_config");
        let link = dir.path().join("config");
        fs::write(&real, "Host a\n    HostName x\n").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();
        let store = ServerStore::new(&link);

        store.create(ServerEntry::new("b", "y")).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(
            fs::read_to_string(&real).unwrap(),
            "Host a\n    HostName x\n\nHost b\n    HostName y\n    Port 22\n"
        );
    }

    #[test]
    fn test_connection_string() {
        let entry = ServerEntry::new("a", "example.com").with_user("root");
        assert_eq!(entry.connection_string(), "root@example.com");
        assert_eq!(entry.with_port(2222).connection_string(), "root@example.com:2222");
        assert_eq!(ServerEntry::new("alias", "").connection_string(), "alias");
    }
}
