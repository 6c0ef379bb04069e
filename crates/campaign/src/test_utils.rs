use bitcoin::{
    absolute,
    bip32::Xpriv,
    ecdsa,
    hashes::Hash,
    secp256k1::{Message, Secp256k1},
    sighash::{EcdsaSighashType, SighashCache},
    transaction::Version,
    Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use satfund_config::PledgeConfig;
use satfund_contract::ContractSpend;
use satfund_db_types::types::ProjectEntry;
use satfund_key_derivation::{paths::role_path, PledgerKeys};
use satfund_primitives::{
    ids::UserId, roles::DerivationRole, secret::SecretToken, utxo::UnspentOutput,
};

use crate::{
    messages::InitialResponse,
    params::PledgeParams,
    validate::external_key_hash,
    wallet::{PledgeDraft, PledgerWallet},
};

pub(crate) const NETWORK: Network = Network::Regtest;
pub(crate) const NOW: u64 = 1_700_000_000;
pub(crate) const DEADLINE: u64 = 1_800_000_000;
pub(crate) const GOAL: Amount = Amount::from_sat(500_000);
pub(crate) const AMOUNT: Amount = Amount::from_sat(200_000);

pub(crate) fn params() -> PledgeParams {
    PledgeParams::new(NETWORK, &PledgeConfig::default())
}

pub(crate) fn keys(seed: u8) -> PledgerKeys {
    let master = Xpriv::new_master(NETWORK, &[seed; 32]).unwrap();
    PledgerKeys::new(&master, NETWORK).unwrap()
}

pub(crate) fn wallet(seed: u8) -> PledgerWallet {
    PledgerWallet::new(keys(seed))
}

pub(crate) fn project_entry() -> ProjectEntry {
    let creator = wallet(0xc0);
    let payout = Address::p2pkh(
        external_key_hash(&creator.account_xpub(), 0).unwrap(),
        NETWORK,
    );
    ProjectEntry::new(
        UserId::new(1),
        "solar panels".to_string(),
        payout.script_pubkey(),
        GOAL,
        DEADLINE,
        SecretToken::new([0x42; 32]),
    )
}

/// Outputs paying to the wallet's first external addresses.
pub(crate) fn wallet_utxos(wallet: &PledgerWallet, values: &[u64]) -> Vec<UnspentOutput> {
    let xpub = wallet.account_xpub();
    values
        .iter()
        .enumerate()
        .map(|(i, v)| UnspentOutput {
            txid: Txid::from_byte_array([i as u8 + 1; 32]),
            output_index: i as u32,
            locking_script: Address::p2pkh(
                external_key_hash(&xpub, 1_000 + i as u32).unwrap(),
                NETWORK,
            )
            .script_pubkey(),
            value: Amount::from_sat(*v),
            derivation_path: role_path(DerivationRole::External, 1_000 + i as u32).unwrap(),
        })
        .collect()
}

/// The quote a server would hand out for `project` at the given indices.
pub(crate) fn quote(
    wallet: &PledgerWallet,
    project: &ProjectEntry,
    external_index: u32,
    change_index: u32,
) -> InitialResponse {
    let params = params();
    InitialResponse {
        inputs: wallet_utxos(wallet, &[400_000]),
        secret_hash: project.secret.hash(),
        deadline: project.deadline,
        lock_time: params
            .contract_lock_time(project.deadline)
            .unwrap()
            .to_consensus_u32(),
        refund_lock_time: params
            .refund_lock_time(project.deadline)
            .unwrap()
            .to_consensus_u32(),
        external_index,
        change_index,
        min_fee: params.min_fee.to_sat(),
    }
}

/// Signs `draft`'s locked output over to `project` with an arbitrary sighash
/// type and branch. The wallet only ever produces `ALL|ANYONECANPAY` claims.
pub(crate) fn sign_partial_with(
    seed: u8,
    external_index: u32,
    draft: &PledgeDraft,
    project: &ProjectEntry,
    spend: ContractSpend,
    sighash_type: EcdsaSighashType,
) -> TxIn {
    let key = keys(seed)
        .signing_key(DerivationRole::External, external_index)
        .unwrap();
    let contract = draft.contract();
    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(draft.locked_tx().compute_txid(), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: project.fund_goal(),
            script_pubkey: project.payout_script(),
        }],
    };

    let secp = Secp256k1::new();
    let sighash = SighashCache::new(&tx)
        .legacy_signature_hash(0, &contract.redeem_script(), sighash_type.to_u32())
        .unwrap();
    let signature = ecdsa::Signature {
        signature: secp.sign_ecdsa(&Message::from_digest(sighash.to_byte_array()), &key.inner),
        sighash_type,
    };
    tx.input[0].script_sig = spend
        .script_sig(&contract, &signature, &key.public_key(&secp))
        .unwrap();
    tx.input.remove(0)
}
