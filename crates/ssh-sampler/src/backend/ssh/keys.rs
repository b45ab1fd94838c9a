//! Private key loading.

use std::path::Path;
use std::sync::Arc;

use russh::keys::PrivateKey;

/// Read and decode a private key, decrypting it with `passphrase` if given.
///
/// OpenSSH, PKCS#8 and PEM encodings are accepted. The error is a
/// human-readable reason naming the file.
pub(super) async fn load_private_key(
    path: &Path,
    passphrase: Option<&str>,
) -> Result<Arc<PrivateKey>, String> {
    let key_data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("failed to read key file {}: {e}", path.display()))?;

    let key = russh::keys::decode_secret_key(&key_data, passphrase).map_err(|e| {
        if passphrase.is_none() && e.to_string().contains("encrypted") {
            format!(
                "key {} appears to be encrypted but no passphrase was provided",
                path.display()
            )
        } else {
            format!("failed to decode key {}: {e}", path.display())
        }
    })?;

    Ok(Arc::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_file_names_path() {
        let reason = load_private_key(Path::new("/nonexistent/id_ed25519"), None)
            .await
            .unwrap_err();
        assert!(reason.contains("/nonexistent/id_ed25519"));
    }

    #[tokio::test]
    async fn garbage_key_is_decode_error() {
        let path = std::env::temp_dir().join(format!("ssh-sampler-bad-key-{}", std::process::id()));
        tokio::fs::write(&path, "not a key").await.unwrap();
        let reason = load_private_key(&path, None).await.unwrap_err();
        let _ = tokio::fs::remove_file(&path).await;
        assert!(reason.contains("failed to decode key"));
    }
}
