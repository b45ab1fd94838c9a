//! `known_hosts` lookup and trust-on-first-use recording.
//!
//! Entries use the OpenSSH layout `hostnames keytype base64 [comment]`. Hosts
//! on a non-standard port are written `[host]:port`. Hashed hostnames and
//! `@cert-authority`/`@revoked` markers are not understood and never match.

use std::io::Write;
use std::path::{Path, PathBuf};

use russh::keys::{HashAlg, PublicKey};

use crate::config::DEFAULT_PORT;

/// Environment variable overriding the `known_hosts` location.
pub const KNOWN_HOSTS_ENV: &str = "SSH_KNOWN_HOSTS";

const SUPPORTED_KEY_TYPES: &[&str] = &[
    "ssh-ed25519",
    "ssh-rsa",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
];

/// The `known_hosts` file to use: `$SSH_KNOWN_HOSTS`, else
/// `~/.ssh/known_hosts`.
#[must_use]
pub fn known_hosts_path() -> PathBuf {
    if let Ok(path) = std::env::var(KNOWN_HOSTS_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".ssh").join("known_hosts")
}

/// Outcome of checking a server key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownHostsMatch {
    /// An entry for the host carries this key.
    Trusted,
    /// The host is listed with a different key.
    Mismatch,
    /// The host is not listed, or the file is unreadable.
    Unknown,
}

/// Host pattern as written in `known_hosts`.
fn host_entry(host: &str, port: u16) -> String {
    if port == DEFAULT_PORT {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

/// Keys listed for `host:port` in `contents`, in file order.
fn keys_for<'a>(
    contents: &'a str,
    host: &'a str,
    port: u16,
) -> impl Iterator<Item = PublicKey> + 'a {
    let pattern = host_entry(host, port);
    contents.lines().filter_map(move |line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('@') {
            return None;
        }
        let mut fields = line.split_whitespace();
        let hostnames = fields.next()?;
        let key_type = fields.next()?;
        let key_data = fields.next()?;
        let listed = hostnames
            .split(',')
            .any(|h| h == pattern || h == "*" || (port == DEFAULT_PORT && h == host));
        if !listed {
            return None;
        }
        if !SUPPORTED_KEY_TYPES.contains(&key_type) {
            tracing::debug!(key_type, "Unknown key type in known_hosts");
            return None;
        }
        russh::keys::parse_public_key_base64(key_data).ok()
    })
}

fn same_key(a: &PublicKey, b: &PublicKey) -> bool {
    a.fingerprint(HashAlg::Sha256) == b.fingerprint(HashAlg::Sha256)
}

/// Check `key` against already loaded `known_hosts` contents.
#[must_use]
pub fn check(contents: &str, host: &str, port: u16, key: &PublicKey) -> KnownHostsMatch {
    let mut listed = false;
    for stored in keys_for(contents, host, port) {
        if same_key(&stored, key) {
            return KnownHostsMatch::Trusted;
        }
        listed = true;
    }
    if listed {
        KnownHostsMatch::Mismatch
    } else {
        KnownHostsMatch::Unknown
    }
}

/// A `known_hosts` file on disk.
#[derive(Debug, Clone)]
pub struct KnownHostsFile {
    path: PathBuf,
}

impl KnownHostsFile {
    /// Wrap a path; the file need not exist.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check a server key. A missing or unreadable file yields `Unknown`.
    #[must_use]
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> KnownHostsMatch {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(
                    host,
                    path = %self.path.display(),
                    error = %e,
                    "Cannot read known_hosts, rejecting key"
                );
                return KnownHostsMatch::Unknown;
            }
        };
        let outcome = check(&contents, host, port, key);
        match outcome {
            KnownHostsMatch::Trusted => {
                tracing::debug!(host, "Host key verified against known_hosts");
            }
            KnownHostsMatch::Mismatch => {
                tracing::error!(host, "HOST KEY MISMATCH! Possible man-in-the-middle attack!");
            }
            KnownHostsMatch::Unknown => {
                tracing::warn!(host, "Host not found in known_hosts file");
            }
        }
        outcome
    }

    /// Accept unknown hosts and record them; reject listed hosts whose key
    /// changed.
    ///
    /// A key that cannot be recorded is still accepted for this connection.
    #[must_use]
    pub fn trust_on_first_use(&self, host: &str, port: u16, key: &PublicKey) -> bool {
        let contents = std::fs::read_to_string(&self.path).unwrap_or_default();
        match check(&contents, host, port, key) {
            KnownHostsMatch::Trusted => true,
            KnownHostsMatch::Mismatch => {
                tracing::error!(host, "HOST KEY MISMATCH! Possible man-in-the-middle attack!");
                false
            }
            KnownHostsMatch::Unknown => {
                if let Err(e) = self.append(host, port, key) {
                    tracing::warn!(
                        host,
                        path = %self.path.display(),
                        error = %e,
                        "Failed to record host key, accepting without saving"
                    );
                } else {
                    tracing::info!(
                        host,
                        path = %self.path.display(),
                        "Added host key to known_hosts (TOFU)"
                    );
                }
                true
            }
        }
    }

    fn append(&self, host: &str, port: u16, key: &PublicKey) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let mode = std::fs::Permissions::from_mode(0o700);
                    let _ = std::fs::set_permissions(parent, mode);
                }
            }
        }
        let encoded = key
            .to_openssh()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        let key_str = encoded.split_whitespace().take(2).collect::<Vec<_>>().join(" ");

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{} {key_str}", host_entry(host, port))
    }
}
