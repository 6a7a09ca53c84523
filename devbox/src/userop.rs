//! ERC-4337 v0.7 user operations as bundlers report them, and their on-chain packed form.

use std::{fmt, str::FromStr};

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::sol;
use serde::{Deserialize, Deserializer, Serialize, de};

sol! {
    /// Packed user operation as accepted by the v0.7 entry point.
    #[allow(missing_docs)]
    #[derive(Debug, Default, PartialEq, Eq)]
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes paymasterAndData;
        bytes signature;
    }

    /// The entry point functions devbox calls.
    #[allow(missing_docs)]
    interface IEntryPoint {
        function getUserOpHash(PackedUserOperation calldata userOp) external view returns (bytes32);
    }
}

/// Unpacked v0.7 user operation in its JSON-RPC shape.
///
/// Optional fields may be absent, `null`, empty or `"0x"`; all of those mean unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// Account sending the operation.
    pub sender: Address,
    /// Anti-replay nonce.
    #[serde(default, deserialize_with = "lenient")]
    pub nonce: U256,
    /// Factory deploying the account, if it does not exist yet.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    /// Calldata for the factory.
    #[serde(default, deserialize_with = "lenient")]
    pub factory_data: Bytes,
    /// Calldata executed by the account.
    #[serde(default, deserialize_with = "lenient")]
    pub call_data: Bytes,
    /// Gas for the execution phase.
    #[serde(default, deserialize_with = "lenient")]
    pub call_gas_limit: U256,
    /// Gas for the verification phase.
    #[serde(default, deserialize_with = "lenient")]
    pub verification_gas_limit: U256,
    /// Gas paid to the bundler up front.
    #[serde(default, deserialize_with = "lenient")]
    pub pre_verification_gas: U256,
    /// EIP-1559 max fee.
    #[serde(default, deserialize_with = "lenient")]
    pub max_fee_per_gas: U256,
    /// EIP-1559 priority fee.
    #[serde(default, deserialize_with = "lenient")]
    pub max_priority_fee_per_gas: U256,
    /// Paymaster sponsoring the operation.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    /// Gas for paymaster validation.
    #[serde(default, deserialize_with = "lenient")]
    pub paymaster_verification_gas_limit: U256,
    /// Gas for the paymaster post-op call.
    #[serde(default, deserialize_with = "lenient")]
    pub paymaster_post_op_gas_limit: U256,
    /// Data passed to the paymaster.
    #[serde(default, alias = "paymasterAndData", deserialize_with = "lenient")]
    pub paymaster_data: Bytes,
    /// Account signature.
    #[serde(default, deserialize_with = "lenient")]
    pub signature: Bytes,
}

impl UserOperation {
    /// `factory ++ factoryData`, or empty without a factory.
    pub fn init_code(&self) -> Bytes {
        match self.factory {
            Some(factory) => [factory.as_slice(), &self.factory_data[..]].concat().into(),
            None => Bytes::new(),
        }
    }

    /// `paymaster ++ verificationGas(16) ++ postOpGas(16) ++ paymasterData`, or empty without a
    /// paymaster.
    pub fn paymaster_and_data(&self) -> Bytes {
        let Some(paymaster) = self.paymaster else {
            return Bytes::new();
        };
        let parts: [&[u8]; 4] = [
            paymaster.as_slice(),
            &low_128(self.paymaster_verification_gas_limit),
            &low_128(self.paymaster_post_op_gas_limit),
            &self.paymaster_data,
        ];
        parts.concat().into()
    }

    /// Packs the operation the way the v0.7 entry point hashes it.
    pub fn pack(&self) -> PackedUserOperation {
        PackedUserOperation {
            sender: self.sender,
            nonce: self.nonce,
            initCode: self.init_code(),
            callData: self.call_data.clone(),
            accountGasLimits: pack_halves(self.verification_gas_limit, self.call_gas_limit),
            preVerificationGas: self.pre_verification_gas,
            gasFees: pack_halves(self.max_priority_fee_per_gas, self.max_fee_per_gas),
            paymasterAndData: self.paymaster_and_data(),
            signature: self.signature.clone(),
        }
    }
}

/// Low 16 bytes of a word, big-endian.
fn low_128(value: U256) -> [u8; 16] {
    let word = value.to_be_bytes::<32>();
    let mut out = [0u8; 16];
    out.copy_from_slice(&word[16..]);
    out
}

/// `high(16) ++ low(16)`.
fn pack_halves(high: U256, low: U256) -> B256 {
    let mut out = [0u8; 32];
    out[..16].copy_from_slice(&low_128(high));
    out[16..].copy_from_slice(&low_128(low));
    B256::from(out)
}

fn is_unset(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("0x")
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: fmt::Display,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !is_unset(&raw) => raw.parse().map_err(de::Error::custom),
        _ => Ok(T::default()),
    }
}

fn lenient_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !is_unset(&raw) => raw.parse().map(Some).map_err(de::Error::custom),
        _ => Ok(None),
    }
}
