//! SSH key pairs in a key directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use ssh_key::{Algorithm, EcdsaCurve, HashAlg, Mpint, PublicKey};
use tracing::{debug, info, warn};

use crate::error::{PlakError, Result};
use crate::ssh::{fingerprint_args, parse_fingerprint, run_checked, KeyGenRequest, ProcessRunner, KEYGEN};

/// Files that live in `~/.ssh` but are not private keys
const NON_KEY_FILES: &[&str] = &[
    "authorized_keys",
    "authorized_keys2",
    "config",
    "environment",
    "known_hosts",
    "known_hosts.old",
    "rc",
];

const PUBLIC_SUFFIX: &str = ".pub";

/// Suffix of the hidden file a new key is generated into
const STAGING_SUFFIX: &str = ".plak-new";

/// A private key file and its optional `.pub` sibling
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPair {
    pub name: String,
    pub path: PathBuf,
    pub has_public_key: bool,
}

impl KeyPair {
    pub fn public_path(&self) -> PathBuf {
        public_path(&self.path)
    }
}

/// Key metadata as reported by `ssh-keygen -l`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyDetails {
    pub key_type: String,
    pub bit_length: Option<u32>,
    pub fingerprint: String,
    pub comment: String,
}

impl KeyDetails {
    fn from_public_key(key: &PublicKey) -> Self {
        let algorithm = key.algorithm();
        let key_type = match &algorithm {
            Algorithm::Rsa { .. } => "RSA".to_string(),
            Algorithm::Ed25519 => "ED25519".to_string(),
            Algorithm::Ecdsa { .. } => "ECDSA".to_string(),
            Algorithm::Dsa => "DSA".to_string(),
            Algorithm::SkEd25519 => "ED25519-SK".to_string(),
            Algorithm::SkEcdsaSha2NistP256 => "ECDSA-SK".to_string(),
            other => other.as_str().to_uppercase(),
        };
        let bit_length = match algorithm {
            Algorithm::Ed25519 | Algorithm::SkEd25519 | Algorithm::SkEcdsaSha2NistP256 => Some(256),
            Algorithm::Ecdsa { curve } => Some(match curve {
                EcdsaCurve::NistP256 => 256,
                EcdsaCurve::NistP384 => 384,
                EcdsaCurve::NistP521 => 521,
            }),
            Algorithm::Rsa { .. } => key.key_data().rsa().and_then(|rsa| mpint_bits(&rsa.n)),
            Algorithm::Dsa => key.key_data().dsa().and_then(|dsa| mpint_bits(&dsa.p)),
            _ => None,
        };
        let comment = match key.comment().to_string() {
            c if c.is_empty() => "no comment".to_string(),
            c => c,
        };

        Self {
            key_type,
            bit_length,
            fingerprint: key.fingerprint(HashAlg::Sha256).to_string(),
            comment,
        }
    }
}

fn mpint_bits(value: &Mpint) -> Option<u32> {
    let bytes = value.as_positive_bytes()?;
    let first = *bytes.first()?;
    let len = u32::try_from(bytes.len()).ok()?;
    Some((len - 1) * 8 + (8 - first.leading_zeros()))
}

fn public_path(private: &Path) -> PathBuf {
    let mut name = private.as_os_str().to_os_string();
    name.push(PUBLIC_SUFFIX);
    PathBuf::from(name)
}

/// Key pairs in an SSH key directory
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Private key files sorted by name, each paired with its `.pub` sibling
    pub fn list(&self) -> Result<Vec<KeyPair>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PlakError::from_io(&self.dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !path.is_file() || !is_key_candidate(&name) {
                continue;
            }

            keys.push(KeyPair {
                has_public_key: public_path(&path).is_file(),
                name,
                path,
            });
        }

        keys.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(dir = %self.dir.display(), count = keys.len(), "keys listed");
        Ok(keys)
    }

    pub fn get(&self, name: &str) -> Result<KeyPair> {
        let path = self.private_path(name)?;
        if !path.is_file() {
            return Err(not_found(name));
        }
        Ok(KeyPair {
            name: name.to_string(),
            has_public_key: public_path(&path).is_file(),
            path,
        })
    }

    /// Contents of the `.pub` file, if there is one
    pub fn public_key(&self, name: &str) -> Result<Option<String>> {
        let key = self.get(name)?;
        if !key.has_public_key {
            return Ok(None);
        }
        let pub_path = key.public_path();
        let text = fs::read_to_string(&pub_path).map_err(|e| PlakError::from_io(&pub_path, e))?;
        Ok(Some(text.trim().to_string()))
    }

    /// Type, size, fingerprint and comment of a key. Read from the `.pub`
    /// file when it parses, otherwise asked of `ssh-keygen -l`.
    pub fn inspect(&self, name: &str, runner: &dyn ProcessRunner) -> Result<KeyDetails> {
        let key = self.get(name)?;
        let inspection = |reason: String| PlakError::Inspection {
            name: name.to_string(),
            reason,
        };

        if key.has_public_key {
            let pub_path = key.public_path();
            let text = fs::read_to_string(&pub_path)
                .map_err(|e| inspection(format!("cannot read {}: {e}", pub_path.display())))?;
            match PublicKey::from_openssh(text.trim()) {
                Ok(public) => return Ok(KeyDetails::from_public_key(&public)),
                Err(e) => warn!(key = name, error = %e, "public key did not parse, using ssh-keygen"),
            }
        }

        let target = if key.has_public_key {
            key.public_path()
        } else {
            key.path.clone()
        };

        let output = run_checked(runner, KEYGEN, &fingerprint_args(&target))
            .map_err(|e| inspection(e.to_string()))?;
        parse_fingerprint(&output.stdout)
            .ok_or_else(|| inspection(format!("unexpected {KEYGEN} output: {}", output.stdout.trim())))
    }

    /// Remove the private key and, if present, its public key
    pub fn delete(&self, name: &str) -> Result<()> {
        let key = self.get(name)?;

        fs::remove_file(&key.path).map_err(|e| PlakError::from_io(&key.path, e))?;
        info!(path = %key.path.display(), "private key deleted");

        let pub_path = key.public_path();
        if pub_path.exists() {
            fs::remove_file(&pub_path).map_err(|source| PlakError::PartialDelete {
                name: name.to_string(),
                source,
            })?;
            info!(path = %pub_path.display(), "public key deleted");
        }
        Ok(())
    }

    /// Generate a pair with `ssh-keygen`. An existing pair with the same
    /// name is only replaced when `overwrite` is set, and only once the new
    /// pair has been written under a staging name next to it.
    pub fn generate(
        &self,
        runner: &dyn ProcessRunner,
        request: &KeyGenRequest,
        overwrite: bool,
    ) -> Result<KeyPair> {
        let path = self.private_path(&request.name)?;
        if path.exists() && !overwrite {
            return Err(PlakError::DuplicateName {
                what: "key",
                name: request.name.clone(),
            });
        }
        self.ensure_dir()?;

        let staging = self.dir.join(format!(".{}{STAGING_SUFFIX}", request.name));
        let staging_pub = public_path(&staging);
        // ssh-keygen asks before overwriting, so clear leftovers of an earlier run
        discard(&staging)?;
        discard(&staging_pub)?;

        if let Err(e) = run_checked(runner, KEYGEN, &request.args(&staging)) {
            discard(&staging)?;
            discard(&staging_pub)?;
            return Err(e);
        }
        if !staging.is_file() {
            return Err(PlakError::Process {
                program: KEYGEN.to_string(),
                message: format!("no key written to {}", staging.display()),
            });
        }

        let pub_path = public_path(&path);
        fs::rename(&staging, &path).map_err(|e| PlakError::from_io(&path, e))?;
        if staging_pub.is_file() {
            fs::rename(&staging_pub, &pub_path).map_err(|e| PlakError::from_io(&pub_path, e))?;
        } else {
            // a stale public key would no longer match
            discard(&pub_path)?;
        }
        info!(key = %request.name, key_type = %request.key_type, "key generated");

        Ok(KeyPair {
            name: request.name.clone(),
            has_public_key: pub_path.is_file(),
            path,
        })
    }

    fn private_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && !name.ends_with(PUBLIC_SUFFIX);
        if !valid {
            return Err(PlakError::InvalidEntry(format!("'{name}' is not a key file name")));
        }
        Ok(self.dir.join(name))
    }

    fn ensure_dir(&self) -> Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| PlakError::from_io(&self.dir, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }
}

fn is_key_candidate(name: &str) -> bool {
    !name.ends_with(PUBLIC_SUFFIX) && !name.starts_with('.') && !NON_KEY_FILES.contains(&name)
}

/// Remove a file if it exists
fn discard(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PlakError::from_io(path, e)),
    }
}

fn not_found(name: &str) -> PlakError {
    PlakError::NotFound {
        what: "key",
        key: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::testing::FakeRunner;
    use crate::ssh::KeyType;
    use tempfile::TempDir;

    const ED25519_PUB: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAILM+rvN+ot98qgEN796jTiQfZfG1KaT0PtFDJ/XFSqti user@example.com";

    const RSA_PUB: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQDUgsF/ryxcG5E2e39yfdmquiZI922L0FlfLPlOLWxEsvQsmzHS3OwdOtd+dngzJW3osuaiGc3YeS+37N192+7H0ZQyNXUpg5gSjZyjZCY4iFwpicOPBUqM3D58uAfxIPezQQ6joiJISR2EKwwB3k7DAqhmHDghLelvik6s3A9UUWI+s64eQBkCw6T0Xt1Whq9aFFo0SchXjUeR1yHmKxXA7Hkqf0MXshwL4OACCRxmauqesD/6g9v9q76zraaDPsWBwsRTCO+RkHZXkDq4E+gCjfNU63hq6Ri8YHUs73wqsoLfT6fxzGDO24e4zOHGF2R/02viHAL4+9AsvOOEcOwz rsa@test";

    const ECDSA_PUB: &str = "ecdsa-sha2-nistp384 AAAAE2VjZHNhLXNoYTItbmlzdHAzODQAAAAIbmlzdHAzODQAAABhBGKqKD4Bjurj7m0ceD6IFhsHUuPMeVBtlHNbmk0uKuhAP6laOjHlPyz6xBYkLev/gnvqL9X6Th9GLifUaSPuYrKuhReSzhtdUyWvgT2NvSHcNBgaILDUKKPz900CGerheA== ";

    fn key_dir(files: &[(&str, &str)]) -> (TempDir, KeyStore) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        let store = KeyStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_list_pairs_and_filters() {
        let (dir, store) = key_dir(&[
            ("id_rsa", "PRIVATE"),
            ("id_rsa.pub", RSA_PUB),
            ("deploy", "PRIVATE"),
            ("orphan.pub", ED25519_PUB),
            ("config", "Host x\n"),
            ("known_hosts", ""),
            ("authorized_keys", ""),
            (".DS_Store", ""),
        ]);
        fs::create_dir(dir.path().join("sockets")).unwrap();

        let keys = store.list().unwrap();

        let summary: Vec<_> = keys.iter().map(|k| (k.name.as_str(), k.has_public_key)).collect();
        assert_eq!(summary, vec![("deploy", false), ("id_rsa", true)]);
        assert_eq!(keys[1].path, dir.path().join("id_rsa"));
    }

    #[test]
    fn test_list_missing_dir() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_delete_pair() {
        let (dir, store) = key_dir(&[("id_test", "PRIVATE"), ("id_test.pub", ED25519_PUB)]);

        store.delete("id_test").unwrap();

        assert!(!dir.path().join("id_test").exists());
        assert!(!dir.path().join("id_test.pub").exists());
    }

    #[test]
    fn test_delete_private_only() {
        let (dir, store) = key_dir(&[("id_test", "PRIVATE"), ("other", "PRIVATE")]);

        store.delete("id_test").unwrap();

        assert!(!dir.path().join("id_test").exists());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_missing() {
        let (dir, store) = key_dir(&[("lonely.pub", ED25519_PUB)]);

        assert!(matches!(store.delete("lonely"), Err(PlakError::NotFound { .. })));
        assert!(dir.path().join("lonely.pub").exists());
    }

    #[test]
    fn test_rejects_path_like_names() {
        let (_dir, store) = key_dir(&[]);
        for name in ["../secret", "a/b", "", "..", "id.pub"] {
            assert!(matches!(store.delete(name), Err(PlakError::InvalidEntry(_))), "{name}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_delete_public_failure_is_partial() {
        let (dir, store) = key_dir(&[("id_test", "PRIVATE")]);
        // a directory named like the public key cannot be removed with remove_file
        fs::create_dir(dir.path().join("id_test.pub")).unwrap();

        let err = store.delete("id_test").unwrap_err();

        assert!(matches!(err, PlakError::PartialDelete { ref name, .. } if name == "id_test"));
        assert!(!dir.path().join("id_test").exists());
    }

    #[test]
    fn test_inspect_ed25519_from_public_file() {
        let (_dir, store) = key_dir(&[("id_ed25519", "PRIVATE"), ("id_ed25519.pub", ED25519_PUB)]);
        let runner = FakeRunner::new();

        let details = store.inspect("id_ed25519", &runner).unwrap();

        assert_eq!(
            details,
            KeyDetails {
                key_type: "ED25519".into(),
                bit_length: Some(256),
                fingerprint: "SHA256:UCUiLr7Pjs9wFFJMDByLgc3NrtdU344OgUM45wZPcIQ".into(),
                comment: "user@example.com".into(),
            }
        );
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_inspect_rsa_bits() {
        let (_dir, store) = key_dir(&[("id_rsa", "PRIVATE"), ("id_rsa.pub", RSA_PUB)]);

        let details = store.inspect("id_rsa", &FakeRunner::new()).unwrap();

        assert_eq!(details.key_type, "RSA");
        assert_eq!(details.bit_length, Some(2048));
        assert_eq!(details.fingerprint, "SHA256:eMBdk63Cd8EIeRPqFewGYS0orOJkfm+cGymWLMulO7U");
        assert_eq!(details.comment, "rsa@test");
    }

    #[test]
    fn test_inspect_ecdsa_without_comment() {
        let (_dir, store) = key_dir(&[("id_ecdsa", "PRIVATE"), ("id_ecdsa.pub", ECDSA_PUB)]);

        let details = store.inspect("id_ecdsa", &FakeRunner::new()).unwrap();

        assert_eq!(details.key_type, "ECDSA");
        assert_eq!(details.bit_length, Some(384));
        assert_eq!(details.comment, "no comment");
    }

    #[test]
    fn test_inspect_falls_back_to_keygen() {
        let (dir, store) = key_dir(&[("legacy", "PRIVATE")]);
        let runner = FakeRunner::new();
        runner.push_stdout("1024 SHA256:abc legacy@box (DSA)\n");

        let details = store.inspect("legacy", &runner).unwrap();

        assert_eq!(details.key_type, "DSA");
        assert_eq!(details.bit_length, Some(1024));
        let calls = runner.calls();
        assert_eq!(calls[0].0, "ssh-keygen");
        assert_eq!(
            calls[0].1,
            vec!["-l".to_string(), "-f".into(), dir.path().join("legacy").display().to_string()]
        );
    }

    #[test]
    fn test_inspect_failure() {
        let (_dir, store) = key_dir(&[("broken", "PRIVATE"), ("broken.pub", "garbage")]);
        let runner = FakeRunner::new();
        runner.push_failure("broken.pub is not a public key file.");

        let err = store.inspect("broken", &runner).unwrap_err();

        assert!(matches!(err, PlakError::Inspection { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_inspect_unparsable_output() {
        let (_dir, store) = key_dir(&[("odd", "PRIVATE")]);
        let runner = FakeRunner::new();
        runner.push_stdout("something unexpected\n");

        assert!(matches!(
            store.inspect("odd", &runner),
            Err(PlakError::Inspection { .. })
        ));
    }

    #[test]
    fn test_public_key_text() {
        let with_newline = format!("{ED25519_PUB}\n");
        let (_dir, store) = key_dir(&[("a", "PRIVATE"), ("a.pub", with_newline.as_str()), ("b", "P")]);

        assert_eq!(store.public_key("a").unwrap().as_deref(), Some(ED25519_PUB));
        assert_eq!(store.public_key("b").unwrap(), None);
    }

    #[test]
    fn test_generate_invokes_keygen() {
        let (dir, store) = key_dir(&[]);
        let runner = FakeRunner::new().with_keygen_files();
        let request = KeyGenRequest::new("id_new", KeyType::Ed25519);

        let key = store.generate(&runner, &request, false).unwrap();

        assert_eq!(key.path, dir.path().join("id_new"));
        assert!(key.has_public_key);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "ssh-keygen");
        assert!(calls[0].1.contains(&dir.path().join(".id_new.plak-new").display().to_string()));

        // staging files are renamed into place
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_generate_refuses_existing() {
        let (dir, store) = key_dir(&[("id_rsa", "OLD")]);
        let runner = FakeRunner::new();

        let err = store
            .generate(&runner, &KeyGenRequest::new("id_rsa", KeyType::Rsa), false)
            .unwrap_err();

        assert!(matches!(err, PlakError::DuplicateName { .. }));
        assert!(runner.calls().is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("id_rsa")).unwrap(), "OLD");
    }

    #[test]
    fn test_generate_overwrite_replaces_old_pair() {
        let (dir, store) = key_dir(&[("id_rsa", "OLD"), ("id_rsa.pub", RSA_PUB)]);
        let runner = FakeRunner::new().with_keygen_files();

        store
            .generate(&runner, &KeyGenRequest::new("id_rsa", KeyType::Rsa), true)
            .unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("id_rsa")).unwrap(), "NEW PRIVATE");
        assert_eq!(fs::read_to_string(dir.path().join("id_rsa.pub")).unwrap(), "NEW PUBLIC");
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_failed_overwrite_keeps_old_pair() {
        let (dir, store) = key_dir(&[("id_rsa", "OLD"), ("id_rsa.pub", RSA_PUB)]);
        let runner = FakeRunner::new().with_keygen_files();
        runner.push_failure("Passphrase is too short (minimum five characters)");

        let err = store
            .generate(&runner, &KeyGenRequest::new("id_rsa", KeyType::Rsa), true)
            .unwrap_err();

        assert!(matches!(err, PlakError::Process { .. }));
        assert_eq!(fs::read_to_string(dir.path().join("id_rsa")).unwrap(), "OLD");
        assert_eq!(fs::read_to_string(dir.path().join("id_rsa.pub")).unwrap(), RSA_PUB);
        assert!(!dir.path().join(".id_rsa.plak-new").exists());
    }

    #[test]
    fn test_generate_without_output_keeps_old_pair() {
        let (dir, store) = key_dir(&[("id_rsa", "OLD")]);
        // succeeds but writes nothing
        let runner = FakeRunner::new();

        let err = store
            .generate(&runner, &KeyGenRequest::new("id_rsa", KeyType::Rsa), true)
            .unwrap_err();

        assert!(matches!(err, PlakError::Process { .. }));
        assert_eq!(fs::read_to_string(dir.path().join("id_rsa")).unwrap(), "OLD");
    }

    #[test]
    fn test_generate_failure() {
        let (_dir, store) = key_dir(&[]);
        let runner = FakeRunner::new();
        runner.push_spawn_error("ssh-keygen");

        let err = store
            .generate(&runner, &KeyGenRequest::new("k", KeyType::Ed25519), false)
            .unwrap_err();
        assert!(matches!(err, PlakError::Process { .. }));
    }

    #[test]
    fn test_inspect_unreadable_public_key() {
        let (dir, store) = key_dir(&[("k", "PRIVATE")]);
        fs::write(dir.path().join("k.pub"), [0xff, 0xfe, b'x']).unwrap();
        let runner = FakeRunner::new();

        let err = store.inspect("k", &runner).unwrap_err();

        assert!(matches!(err, PlakError::Inspection { ref name, .. } if name == "k"));
        assert!(runner.calls().is_empty());
    }
}
