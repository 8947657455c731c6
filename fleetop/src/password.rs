//! Password hashing, the per-host password table, and per-user password files.
//!
//! Three forms of a password exist:
//! - clear text, typed by the operator or read from the `[passwords]` section;
//! - the *digest*, `H("" ‖ clear)`, which is what travels as the HTTP Basic password;
//! - the *salted hash*, `salt$H(salt ‖ digest)`, which is what an agent persists.
//!
//! `H` is PBKDF2-HMAC-SHA256 (100 000 rounds, 128-byte output, hex encoded).

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{config_dir, Config};

const ROUNDS: u32 = 100_000;
const DIGEST_LEN: usize = 128;
const SECTION: &str = "passwords";

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("malformed password hash (expected salt$digest)")]
    MalformedHash,
    #[error("password file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn pbkdf2_hex(clear: &str, salt: &str) -> String {
    let mut out = [0u8; DIGEST_LEN];
    pbkdf2_hmac::<Sha256>(clear.as_bytes(), salt.as_bytes(), ROUNDS, &mut out);
    hex::encode(out)
}

/// Unsalted digest of a clear password: the credential sent over the wire.
pub fn digest(clear: &str) -> String {
    pbkdf2_hex(clear, "")
}

/// Salted hash of `clear` in `salt$digest` form, with a fresh random salt.
pub fn hash(clear: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    let d = pbkdf2_hex(clear, &salt);
    format!("{salt}${d}")
}

/// Split a stored `salt$digest` string.
pub fn parse_hash(stored: &str) -> Result<(&str, &str), PasswordError> {
    match stored.trim().split_once('$') {
        Some((salt, d)) if !d.is_empty() && !d.contains('$') => Ok((salt, d)),
        _ => Err(PasswordError::MalformedHash),
    }
}

/// Check `presented` against a stored salted hash. A malformed hash never matches.
pub fn verify(stored: &str, presented: &str) -> bool {
    let (salt, expected) = match parse_hash(stored) {
        Ok(parts) => parts,
        Err(e) => {
            warn!("{e}; treating as no password");
            return false;
        }
    };
    let recomputed = pbkdf2_hex(presented, salt);
    recomputed.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Host -> clear password table loaded from the `[passwords]` section.
#[derive(Debug, Clone, Default)]
pub struct PasswordVault {
    entries: BTreeMap<String, String>,
}

impl PasswordVault {
    pub fn from_config(config: &Config) -> Self {
        if !config.has_section(SECTION) {
            warn!("No [{SECTION}] section in the configuration file. Cannot load password list.");
            return Self::default();
        }
        let mut entries = config.items(SECTION);
        entries.remove("local_password_path");
        info!("{} password(s) loaded from the configuration file", entries.len());
        Self { entries }
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Host-specific entry, else the `default` entry, else nothing.
    pub fn lookup(&self, host: &str) -> Option<&str> {
        self.entries
            .get(host)
            .or_else(|| self.entries.get("default"))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `<dir>/<username>.pwd`, holding one salted hash.
#[derive(Debug, Clone)]
pub struct PasswordFile {
    path: PathBuf,
}

impl PasswordFile {
    pub fn new(username: &str, config: Option<&Config>) -> Self {
        let dir = config
            .and_then(|c| c.get_value(SECTION, "local_password_path"))
            .map(PathBuf::from)
            .unwrap_or_else(config_dir);
        Self::in_dir(&dir, username)
    }

    pub fn in_dir(dir: &Path, username: &str) -> Self {
        Self {
            path: dir.join(format!("{username}.pwd")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<String, PasswordError> {
        let s = fs::read_to_string(&self.path).map_err(|source| PasswordError::Io {
            path: self.path.clone(),
            source,
        })?;
        let s = s.trim().to_string();
        parse_hash(&s)?;
        Ok(s)
    }

    /// Create or overwrite the file, readable by the owner only.
    pub fn save(&self, salted_hash: &str) -> Result<(), PasswordError> {
        let io_err = |source| PasswordError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut opts = fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut f = opts.open(&self.path).map_err(io_err)?;
        f.write_all(salted_hash.as_bytes()).map_err(io_err)?;
        info!("Password saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let h = hash("s3cret");
        assert!(verify(&h, "s3cret"));
        assert!(!verify(&h, "s3creT"));
    }

    #[test]
    fn salts_differ_between_calls() {
        let a = hash("same");
        let b = hash("same");
        assert_ne!(a, b);
        assert_ne!(parse_hash(&a).unwrap().0, parse_hash(&b).unwrap().0);
    }

    #[test]
    fn digest_is_deterministic_hex() {
        let d = digest("pw");
        assert_eq!(d, digest("pw"));
        assert_eq!(d.len(), DIGEST_LEN * 2);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(matches!(parse_hash("nodollar"), Err(PasswordError::MalformedHash)));
        assert!(!verify("nodollar", "nodollar"));
    }

    #[test]
    fn lookup_falls_back_to_default() {
        let v = PasswordVault::from_entries([("alpha", "a-pw"), ("default", "d-pw")]);
        assert_eq!(v.lookup("alpha"), Some("a-pw"));
        assert_eq!(v.lookup("beta"), Some("d-pw"));
        let none = PasswordVault::from_entries([("alpha", "a-pw")]);
        assert_eq!(none.lookup("beta"), None);
    }

    #[test]
    fn vault_skips_password_path_key() {
        let cfg = Config::parse(
            "[passwords]\nlocal_password_path = \"/tmp\"\nalpha = \"x\"\n",
        )
        .unwrap();
        let v = PasswordVault::from_config(&cfg);
        assert_eq!(v.len(), 1);
        assert_eq!(v.lookup("alpha"), Some("x"));
    }
}
