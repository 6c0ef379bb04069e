use bitcoin::{
    absolute,
    hashes::{hash160, Hash},
    opcodes::all::{
        OP_CHECKSIG, OP_CLTV, OP_DROP, OP_DUP, OP_ELSE, OP_ENDIF, OP_EQUAL, OP_EQUALVERIFY,
        OP_HASH160, OP_IF,
    },
    script::Instruction,
    Address, Network, PubkeyHash, Script, ScriptBuf, ScriptHash,
};

use crate::error::ContractError;

/// Instruction positions of the dynamic pushes in the redeem script.
const SECRET_HASH_POS: usize = 1;
const LOCK_TIME_POS: usize = 5;
const PUBKEY_HASH_POS: usize = 11;

/// A pledge contract.
///
/// ```text
/// OP_HASH160 <secret_hash> OP_EQUAL
/// OP_IF
/// OP_ELSE
///     <lock_time> OP_CHECKLOCKTIMEVERIFY OP_DROP
/// OP_ENDIF
/// OP_DUP OP_HASH160 <pledger_pubkey_hash> OP_EQUALVERIFY OP_CHECKSIG
/// ```
///
/// Either branch still requires a signature from the pledger's key. The hash
/// branch is checked first, so a correct secret spends regardless of the
/// spending transaction's lock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractScript {
    secret_hash: hash160::Hash,
    pubkey_hash: PubkeyHash,
    lock_time: absolute::LockTime,
}

impl ContractScript {
    /// Fails with [`ContractError::NotTimeBased`] unless `lock_time` is a timestamp.
    pub fn new(
        secret_hash: hash160::Hash,
        pubkey_hash: PubkeyHash,
        lock_time: absolute::LockTime,
    ) -> Result<Self, ContractError> {
        if !lock_time.is_block_time() {
            return Err(ContractError::NotTimeBased(lock_time));
        }
        Ok(Self {
            secret_hash,
            pubkey_hash,
            lock_time,
        })
    }

    pub fn secret_hash(&self) -> hash160::Hash {
        self.secret_hash
    }

    pub fn pubkey_hash(&self) -> PubkeyHash {
        self.pubkey_hash
    }

    pub fn lock_time(&self) -> absolute::LockTime {
        self.lock_time
    }

    pub fn redeem_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_opcode(OP_HASH160)
            .push_slice(self.secret_hash.to_byte_array())
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_IF)
            .push_opcode(OP_ELSE)
            .push_lock_time(self.lock_time)
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
            .push_opcode(OP_ENDIF)
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(self.pubkey_hash.to_byte_array())
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    pub fn script_hash(&self) -> ScriptHash {
        self.redeem_script().script_hash()
    }

    /// The P2SH `script_pubkey` committing to the redeem script.
    pub fn to_locking_form(&self) -> ScriptBuf {
        ScriptBuf::new_p2sh(&self.script_hash())
    }

    pub fn address(&self, network: Network) -> Address {
        Address::p2sh_from_hash(self.script_hash(), network)
    }

    /// Checks whether `script_pubkey` pays to this contract.
    pub fn is_locked_by(&self, script_pubkey: &Script) -> bool {
        script_pubkey == self.to_locking_form().as_script()
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.redeem_script().into_bytes()
    }

    /// Parses a redeem script, accepting only the exact bytes
    /// [`serialize`](Self::serialize) would produce for the parameters found.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, ContractError> {
        let script = Script::from_bytes(bytes);
        let (secret_hash, lock_time, pubkey_hash) =
            extract_params(script).ok_or(ContractError::Malformed)?;

        let lock_time = u32::try_from(lock_time)
            .ok()
            .map(absolute::LockTime::from_consensus)
            .ok_or(ContractError::Malformed)?;

        let contract = Self::new(
            hash160::Hash::from_byte_array(secret_hash),
            PubkeyHash::from_byte_array(pubkey_hash),
            lock_time,
        )?;

        if contract.redeem_script().as_bytes() != bytes {
            return Err(ContractError::Malformed);
        }
        Ok(contract)
    }
}

/// Pulls out the three pushed parameters. Opcodes in between are checked by
/// the caller through reconstruction.
fn extract_params(script: &Script) -> Option<([u8; 20], i64, [u8; 20])> {
    let instructions = script
        .instructions()
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    let push20 = |pos: usize| match instructions.get(pos)? {
        Instruction::PushBytes(bytes) => <[u8; 20]>::try_from(bytes.as_bytes()).ok(),
        _ => None,
    };

    let secret_hash = push20(SECRET_HASH_POS)?;
    let pubkey_hash = push20(PUBKEY_HASH_POS)?;
    let lock_time = match instructions.get(LOCK_TIME_POS)? {
        Instruction::PushBytes(bytes) => decode_script_num(bytes.as_bytes())?,
        _ => return None,
    };

    Some((secret_hash, lock_time, pubkey_hash))
}

/// Little-endian sign-magnitude number as used by script pushes.
fn decode_script_num(bytes: &[u8]) -> Option<i64> {
    let (last, _) = bytes.split_last()?;
    if bytes.len() > 5 {
        return None;
    }
    let mut value: i64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        value |= i64::from(*b) << (8 * i);
    }
    if last & 0x80 != 0 {
        value &= !(0x80i64 << (8 * (bytes.len() - 1)));
        value = -value;
    }
    Some(value)
}
