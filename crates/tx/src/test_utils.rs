use bitcoin::{
    absolute, bip32::Xpriv, hashes::Hash, Amount, Network, PrivateKey, ScriptBuf, Txid,
};
use satfund_contract::ContractScript;
use satfund_key_derivation::{paths::role_path, PledgerKeys};
use satfund_primitives::{roles::DerivationRole, secret::SecretToken, utxo::UnspentOutput};
use secp256k1::SECP256K1;

use crate::{
    funding::{craft_locked_output, LockedOutput, LockedOutputParams},
    refund::RefundParams,
};

pub(crate) const NETWORK: Network = Network::Regtest;
pub(crate) const CONTRACT_LOCK_TIME: u32 = 1_800_000_000;
pub(crate) const REFUND_LOCK_TIME: u32 = CONTRACT_LOCK_TIME + 3_600;
pub(crate) const MIN_FEE: Amount = Amount::from_sat(10_000);
pub(crate) const CONTRACT_INDEX: u32 = 100;

pub(crate) fn pledger(seed: u8) -> PledgerKeys {
    let master = Xpriv::new_master(NETWORK, &[seed; 32]).unwrap();
    PledgerKeys::new(&master, NETWORK).unwrap()
}

pub(crate) fn secret() -> SecretToken {
    SecretToken::new([0x5e; 32])
}

pub(crate) fn project_script() -> ScriptBuf {
    pledger(0xfe)
        .address(DerivationRole::External, 0)
        .unwrap()
        .script_pubkey()
}

/// Outputs paying to the pledger's first external addresses.
pub(crate) fn funding_utxos(keys: &PledgerKeys, values: &[u64]) -> Vec<UnspentOutput> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| UnspentOutput {
            txid: Txid::from_byte_array([i as u8 + 1; 32]),
            output_index: i as u32,
            locking_script: keys
                .address(DerivationRole::External, i as u32)
                .unwrap()
                .script_pubkey(),
            value: Amount::from_sat(*v),
            derivation_path: role_path(DerivationRole::External, i as u32).unwrap(),
        })
        .collect()
}

pub(crate) fn contract_key(keys: &PledgerKeys) -> PrivateKey {
    keys.signing_key(DerivationRole::External, CONTRACT_INDEX)
        .unwrap()
}

pub(crate) fn contract_for(keys: &PledgerKeys, secret: &SecretToken) -> ContractScript {
    let pubkey = contract_key(keys).public_key(SECP256K1);
    ContractScript::new(
        secret.hash(),
        pubkey.pubkey_hash(),
        absolute::LockTime::from_time(CONTRACT_LOCK_TIME).unwrap(),
    )
    .unwrap()
}

/// Locks `amount` from a single funding output of `funding` sats.
pub(crate) fn locked_pledge(seed: u8, funding: u64, amount: u64) -> (PledgerKeys, LockedOutput) {
    let keys = pledger(seed);
    let inputs = funding_utxos(&keys, &[funding]);
    let signing_keys = keys.signing_keys_for(&inputs).unwrap();
    let contract = contract_for(&keys, &secret());

    let locked = craft_locked_output(&LockedOutputParams {
        inputs: &inputs,
        signing_keys: &signing_keys,
        amount: Amount::from_sat(amount),
        min_fee: MIN_FEE,
        contract,
        change_script: keys
            .address(DerivationRole::Change, 0)
            .unwrap()
            .script_pubkey(),
        refund: RefundParams {
            refund_script: keys
                .address(DerivationRole::External, CONTRACT_INDEX)
                .unwrap()
                .script_pubkey(),
            signing_key: contract_key(&keys),
            lock_time: absolute::LockTime::from_time(REFUND_LOCK_TIME).unwrap(),
            min_fee: MIN_FEE,
        },
    })
    .unwrap();

    (keys, locked)
}
