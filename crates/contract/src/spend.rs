use bitcoin::{
    ecdsa,
    opcodes::all::OP_PUSHBYTES_0,
    script::{Instruction, PushBytesBuf},
    PublicKey, Script, ScriptBuf,
};
use satfund_primitives::secret::SecretToken;

use crate::{error::ContractError, script::ContractScript};

/// Branch taken when unlocking a [`ContractScript`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractSpend {
    /// Hash branch, used by the funding transaction.
    Claim { secret: SecretToken },

    /// Time-lock branch, used by the refund transaction.
    Refund,
}

impl ContractSpend {
    /// Builds `<sig> <pubkey> <secret | empty> <redeem_script>`.
    pub fn script_sig(
        &self,
        contract: &ContractScript,
        signature: &ecdsa::Signature,
        pubkey: &PublicKey,
    ) -> Result<ScriptBuf, ContractError> {
        let sig = PushBytesBuf::try_from(signature.to_vec())?;
        let redeem = PushBytesBuf::try_from(contract.serialize())?;

        let builder = ScriptBuf::builder().push_slice(&sig).push_key(pubkey);
        let builder = match self {
            Self::Claim { secret } => builder.push_slice(secret.as_bytes()),
            Self::Refund => builder.push_opcode(OP_PUSHBYTES_0),
        };
        Ok(builder.push_slice(&redeem).into_script())
    }
}

/// The pieces of a contract unlocking script.
#[derive(Debug, Clone)]
pub struct ParsedSpend {
    pub spend: ContractSpend,
    pub signature: ecdsa::Signature,
    pub pubkey: PublicKey,
    pub contract: ContractScript,
}

impl ParsedSpend {
    /// Splits a scriptSig produced by [`ContractSpend::script_sig`].
    pub fn parse(script_sig: &Script) -> Result<Self, ContractError> {
        let pushes = script_sig
            .instructions()
            .map(|ins| match ins {
                Ok(Instruction::PushBytes(bytes)) => Ok(bytes.as_bytes().to_vec()),
                _ => Err(ContractError::MalformedUnlock("expected only data pushes")),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let [sig, pubkey, branch, redeem] = pushes.as_slice() else {
            return Err(ContractError::MalformedUnlock("expected four pushes"));
        };

        let spend = match branch.len() {
            0 => ContractSpend::Refund,
            32 => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(branch);
                ContractSpend::Claim {
                    secret: SecretToken::new(bytes),
                }
            }
            _ => return Err(ContractError::MalformedUnlock("unexpected secret length")),
        };

        Ok(Self {
            spend,
            signature: ecdsa::Signature::from_slice(sig)?,
            pubkey: PublicKey::from_slice(pubkey)?,
            contract: ContractScript::deserialize(redeem)?,
        })
    }
}
