//! Local keystore handling for the coinbase and beneficiary keys.

use std::path::{Path, PathBuf};

use alloy_signer_local::PrivateKeySigner;
use tokio::task::spawn_blocking;
use tracing::debug;

use super::WalletError;

/// Password protecting every devbox keystore entry.
pub const KEYSTORE_PASSWORD: &str = "";

/// Moves a staged keystore file into `keystore_dir` and returns its signer.
///
/// The staged file is decrypted, re-encrypted under the same file name in `keystore_dir`, and
/// then deleted.
pub async fn import_keystore(
    staged: &Path,
    keystore_dir: &Path,
    password: &str,
) -> Result<PrivateKeySigner, WalletError> {
    let staged = staged.to_path_buf();
    let keystore_dir = keystore_dir.to_path_buf();
    let password = password.to_string();

    run_blocking(move || {
        let key_import = |source| WalletError::KeyImport { path: staged.clone(), source };

        let signer = PrivateKeySigner::decrypt_keystore(&staged, &password).map_err(key_import)?;
        std::fs::create_dir_all(&keystore_dir)
            .map_err(|source| WalletError::KeystoreIo { path: keystore_dir.clone(), source })?;

        let name = staged.file_name().and_then(|name| name.to_str()).map(str::to_string);
        PrivateKeySigner::encrypt_keystore(
            &keystore_dir,
            &mut rand::thread_rng(),
            signer.credential().to_bytes(),
            &password,
            name.as_deref(),
        )
        .map_err(key_import)?;

        std::fs::remove_file(&staged)
            .map_err(|source| WalletError::KeystoreIo { path: staged.clone(), source })?;
        debug!(address = %signer.address(), dir = %keystore_dir.display(), "imported keystore");
        Ok(signer)
    })
    .await
}

/// Creates a fresh random key stored in `keystore_dir`.
pub async fn generate_keystore(
    keystore_dir: &Path,
    password: &str,
) -> Result<PrivateKeySigner, WalletError> {
    let keystore_dir: PathBuf = keystore_dir.to_path_buf();
    let password = password.to_string();

    run_blocking(move || {
        std::fs::create_dir_all(&keystore_dir)
            .map_err(|source| WalletError::KeystoreIo { path: keystore_dir.clone(), source })?;
        let (signer, id) =
            PrivateKeySigner::new_keystore(&keystore_dir, &mut rand::thread_rng(), &password, None)
                .map_err(|source| WalletError::KeyGeneration {
                    dir: keystore_dir.clone(),
                    source,
                })?;
        debug!(address = %signer.address(), %id, "generated keystore");
        Ok(signer)
    })
    .await
}

async fn run_blocking<T, F>(f: F) -> Result<T, WalletError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, WalletError> + Send + 'static,
{
    spawn_blocking(f).await.map_err(|e| WalletError::Task(e.to_string()))?
}
