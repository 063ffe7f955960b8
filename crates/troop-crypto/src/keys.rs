use std::path::{Path, PathBuf};

use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::info;
use zeroize::Zeroizing;

use troop_core::error::CoordinatorError;

const PRIVATE_KEY_FILE: &str = "ticket_signing_key.pem";
const PUBLIC_KEY_FILE: &str = "ticket_verifying_key.pem";

/// RSA key size for ticket signing.
const KEY_BITS: usize = 2048;

/// Holds the coordinator's ticket-signing keypair.
///
/// The private half never leaves this process; workers verify tickets locally
/// against the public PEM fetched from `/public-key`, so compromise is
/// contained by rotating the key files and redistributing.
pub struct KeyManager {
    public_pem: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl KeyManager {
    /// Load the keypair from `keys_dir`, generating and persisting a fresh
    /// one on first startup. The private key file is written owner-read-only.
    pub fn ensure(keys_dir: &Path) -> Result<Self, CoordinatorError> {
        let private_path = keys_dir.join(PRIVATE_KEY_FILE);
        let public_path = keys_dir.join(PUBLIC_KEY_FILE);

        let (private_pem, public_pem) = if private_path.exists() && public_path.exists() {
            info!(dir = %keys_dir.display(), "loading ticket signing keys");
            (
                Zeroizing::new(read_key_file(&private_path)?),
                read_key_file(&public_path)?,
            )
        } else {
            info!(dir = %keys_dir.display(), "generating RSA-{KEY_BITS} ticket signing keypair");
            std::fs::create_dir_all(keys_dir)
                .map_err(|e| CoordinatorError::KeyMaterial(e.to_string()))?;
            let (private_pem, public_pem) = generate_keypair()?;
            write_private_key(&private_path, &private_pem)?;
            std::fs::write(&public_path, &public_pem)
                .map_err(|e| CoordinatorError::KeyMaterial(e.to_string()))?;
            (private_pem, public_pem)
        };

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| CoordinatorError::KeyMaterial(format!("private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| CoordinatorError::KeyMaterial(format!("public key: {e}")))?;

        Ok(Self {
            public_pem,
            encoding_key,
            decoding_key,
        })
    }

    /// The public key as SPKI PEM, distributed to workers for local
    /// ticket verification.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

fn generate_keypair() -> Result<(Zeroizing<String>, String), CoordinatorError> {
    let mut rng = rand::rngs::OsRng;
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS)
        .map_err(|e| CoordinatorError::KeyMaterial(format!("keygen: {e}")))?;
    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CoordinatorError::KeyMaterial(format!("encode private: {e}")))?;
    let public_pem = RsaPublicKey::from(&private)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CoordinatorError::KeyMaterial(format!("encode public: {e}")))?;
    Ok((private_pem, public_pem))
}

fn read_key_file(path: &PathBuf) -> Result<String, CoordinatorError> {
    std::fs::read_to_string(path)
        .map_err(|e| CoordinatorError::KeyMaterial(format!("{}: {e}", path.display())))
}

fn write_private_key(path: &Path, pem: &str) -> Result<(), CoordinatorError> {
    // A leftover read-only key file would make the overwrite fail.
    let _ = std::fs::remove_file(path);
    std::fs::write(path, pem).map_err(|e| CoordinatorError::KeyMaterial(e.to_string()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o400))
            .map_err(|e| CoordinatorError::KeyMaterial(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_keys_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("troop_keys_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn generates_then_reloads_same_keypair() {
        let dir = temp_keys_dir("reload");
        let first = KeyManager::ensure(&dir).expect("generate");
        let second = KeyManager::ensure(&dir).expect("reload");
        assert_eq!(first.public_key_pem(), second.public_key_pem());
        assert!(first.public_key_pem().contains("BEGIN PUBLIC KEY"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn private_key_is_owner_read_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = temp_keys_dir("perms");
        let _keys = KeyManager::ensure(&dir).expect("generate");
        let mode = std::fs::metadata(dir.join(PRIVATE_KEY_FILE))
            .expect("stat private key")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o400);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
