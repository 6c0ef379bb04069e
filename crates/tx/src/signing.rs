use bitcoin::{
    ecdsa,
    hashes::Hash,
    script::PushBytesBuf,
    sighash::{EcdsaSighashType, SighashCache},
    PrivateKey, PublicKey, Script, ScriptBuf, Transaction,
};
use satfund_contract::ContractError;
use secp256k1::{Message, SECP256K1};

use crate::error::TxError;

/// Signs input `idx` of `tx` using the legacy (pre-segwit) sighash algorithm.
pub(crate) fn sign_legacy_input(
    tx: &Transaction,
    idx: usize,
    script_code: &Script,
    sighash_type: EcdsaSighashType,
    key: &PrivateKey,
) -> Result<ecdsa::Signature, TxError> {
    let cache = SighashCache::new(tx);
    let sighash = cache.legacy_signature_hash(idx, script_code, sighash_type.to_u32())?;
    let msg = Message::from_digest(sighash.to_byte_array());

    Ok(ecdsa::Signature {
        signature: SECP256K1.sign_ecdsa(&msg, &key.inner),
        sighash_type,
    })
}

/// `<sig> <pubkey>` unlocking a pay-to-pubkey-hash output.
pub(crate) fn p2pkh_script_sig(
    signature: &ecdsa::Signature,
    pubkey: &PublicKey,
) -> Result<ScriptBuf, TxError> {
    let sig = PushBytesBuf::try_from(signature.to_vec())
        .map_err(ContractError::from)?;
    Ok(ScriptBuf::builder()
        .push_slice(&sig)
        .push_key(pubkey)
        .into_script())
}

pub(crate) fn public_key(key: &PrivateKey) -> PublicKey {
    key.public_key(SECP256K1)
}
