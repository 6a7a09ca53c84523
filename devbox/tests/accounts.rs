//! Developer account derivation.

use alloy_primitives::{address, b256};
use devbox::wallet::{DEV_ACCOUNT_COUNT, DEV_MNEMONIC, derive_account, derive_accounts};

#[test]
fn derives_the_well_known_dev_accounts() {
    let expected = [
        address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
        address!("70997970C51812dc3A010C7d01b50e0d17dc79C8"),
        address!("3C44CdDdB6a900fa2b585dd299e03d12FA4293BC"),
        address!("90F79bf6EB2c4f870365E785982E1f101E93b906"),
        address!("15d34AAf54267DB7D7c367839AAf71A00a2C6A65"),
        address!("9965507D1a55bcC2695C58ba16FB37d819B0A4dc"),
        address!("976EA74026E726554dB657fA54763abd0C3a0aa9"),
        address!("14dC79964da2C08b23698B3D3cc7Ca32193d9955"),
        address!("23618e81E3f5cdF7f54C3d65f7FBc0aBf5B21E8f"),
        address!("a0Ee7A142d267C1f36714E4a8F75612F20a79720"),
    ];

    let accounts = derive_accounts(DEV_MNEMONIC, DEV_ACCOUNT_COUNT).unwrap();
    assert_eq!(accounts.len(), expected.len());
    for (i, (account, expected)) in accounts.iter().zip(expected).enumerate() {
        assert_eq!(account.index as usize, i);
        assert_eq!(account.address, expected, "account {i} address mismatch");
        assert!(account.balance.is_zero());
    }

    assert_eq!(
        accounts[0].private_key,
        b256!("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80")
    );
}

#[test]
fn derivation_is_deterministic() {
    let first = derive_accounts(DEV_MNEMONIC, DEV_ACCOUNT_COUNT).unwrap();
    let second = derive_accounts(DEV_MNEMONIC, DEV_ACCOUNT_COUNT).unwrap();
    assert_eq!(first, second);

    let single = derive_account(DEV_MNEMONIC, 7).unwrap();
    assert_eq!(single, first[7]);
}
