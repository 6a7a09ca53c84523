//! Contract init code loaded from hex artifacts on disk.

use std::path::{Path, PathBuf};

use alloy_primitives::{Address, Bytes, hex};
use alloy_sol_types::SolValue;

use super::WalletError;

/// Entry point init code file name.
pub const ENTRY_POINT_ARTIFACT: &str = "EntryPoint.bin";
/// Account factory init code file name.
pub const ACCOUNT_FACTORY_ARTIFACT: &str = "SimpleAccountFactory.bin";
/// Example contract init code file name.
pub const GLOBAL_COUNTER_ARTIFACT: &str = "GlobalCounter.bin";

/// Init code for every contract deployed at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifacts {
    /// ERC-4337 v0.7 entry point.
    pub entry_point: Bytes,
    /// Simple account factory, without constructor arguments.
    pub account_factory: Bytes,
    /// Example counter contract.
    pub global_counter: Bytes,
}

impl ContractArtifacts {
    /// Reads all artifacts from `dir`.
    pub fn load(dir: &Path) -> Result<Self, WalletError> {
        Ok(Self {
            entry_point: read_init_code(&dir.join(ENTRY_POINT_ARTIFACT))?,
            account_factory: read_init_code(&dir.join(ACCOUNT_FACTORY_ARTIFACT))?,
            global_counter: read_init_code(&dir.join(GLOBAL_COUNTER_ARTIFACT))?,
        })
    }

    /// Factory init code with the entry point constructor argument appended.
    pub fn account_factory_init_code(&self, entry_point: Address) -> Result<Bytes, WalletError> {
        if entry_point.is_zero() {
            return Err(WalletError::ZeroEntryPoint);
        }
        let mut code = self.account_factory.to_vec();
        code.extend_from_slice(&entry_point.abi_encode());
        Ok(code.into())
    }
}

fn read_init_code(path: &Path) -> Result<Bytes, WalletError> {
    let invalid = |reason: &str| WalletError::InvalidArtifact {
        path: PathBuf::from(path),
        reason: reason.to_string(),
    };

    let contents = std::fs::read_to_string(path)
        .map_err(|source| WalletError::ArtifactRead { path: path.to_path_buf(), source })?;
    let code = hex::decode(contents.trim()).map_err(|e| invalid(&e.to_string()))?;
    if code.is_empty() {
        return Err(invalid("empty init code"));
    }
    Ok(code.into())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;

    use super::*;

    fn write_all(dir: &Path) {
        std::fs::write(dir.join(ENTRY_POINT_ARTIFACT), "0x6001\n").unwrap();
        std::fs::write(dir.join(ACCOUNT_FACTORY_ARTIFACT), "6002").unwrap();
        std::fs::write(dir.join(GLOBAL_COUNTER_ARTIFACT), "0x6003").unwrap();
    }

    #[test]
    fn loads_prefixed_and_bare_hex() {
        let dir = tempfile::tempdir().unwrap();
        write_all(dir.path());
        let artifacts = ContractArtifacts::load(dir.path()).unwrap();
        assert_eq!(artifacts.entry_point, Bytes::from_static(&[0x60, 0x01]));
        assert_eq!(artifacts.account_factory, Bytes::from_static(&[0x60, 0x02]));
    }

    #[test]
    fn missing_artifact_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ContractArtifacts::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains(ENTRY_POINT_ARTIFACT));
    }

    #[test]
    fn empty_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_all(dir.path());
        std::fs::write(dir.path().join(GLOBAL_COUNTER_ARTIFACT), "0x").unwrap();
        assert!(matches!(
            ContractArtifacts::load(dir.path()),
            Err(WalletError::InvalidArtifact { .. })
        ));
    }

    #[test]
    fn factory_constructor_gets_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        write_all(dir.path());
        let artifacts = ContractArtifacts::load(dir.path()).unwrap();

        let entry_point = address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");
        let code = artifacts.account_factory_init_code(entry_point).unwrap();
        assert_eq!(code.len(), 2 + 32);
        assert_eq!(&code[2 + 12..], entry_point.as_slice());

        assert!(matches!(
            artifacts.account_factory_init_code(Address::ZERO),
            Err(WalletError::ZeroEntryPoint)
        ));
    }
}
