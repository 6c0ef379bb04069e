#![allow(dead_code, unused_crate_dependencies)]

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bitcoin::{
    absolute,
    address::NetworkUnchecked,
    bip32::{Xpriv, Xpub},
    ecdsa,
    hashes::Hash,
    secp256k1::{Message, Secp256k1},
    sighash::{EcdsaSighashType, SighashCache},
    transaction::Version,
    Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use satfund_btcio::{
    BroadcastResponse, Broadcaster, ChainQuery, ClientResult, RefundScheduler,
    RefundSchedulerConfig,
};
use satfund_campaign::{
    create_project, register_user, validate::external_key_hash, InitialResponse, NewProject,
    PartialStatus, PledgeDraft, PledgeParams, PledgeRequest, PledgeResponse, PledgeResult,
    PledgeService, PledgerWallet, TransmitExactAmountResponse,
};
use satfund_config::PledgeConfig;
use satfund_contract::ContractSpend;
use satfund_db_store_sled::{open_sled_backend, SledBackend, SledDbConfig};
use satfund_key_derivation::{paths::role_path, PledgerKeys};
use satfund_primitives::{
    ids::{ProjectId, UserId},
    roles::DerivationRole,
    time::Clock,
    utxo::UnspentOutput,
};
use tempfile::TempDir;
use tokio::time::Instant;

pub const NETWORK: Network = Network::Regtest;
pub const NOW: u64 = 1_700_000_000;
pub const DEADLINE: u64 = NOW + 30 * 86_400;
pub const GOAL: Amount = Amount::from_sat(500_000);
pub const MIN_FEE: Amount = Amount::from_sat(100_000);
pub const REFUND_OFFSET: u64 = 3_600;

/// Wall clock that advances with tokio's, possibly paused, clock.
pub struct TokioClock {
    base: u64,
    start: Instant,
}

impl TokioClock {
    pub fn starting_at(base: u64) -> Self {
        Self {
            base,
            start: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> u64 {
        self.base + self.start.elapsed().as_secs()
    }
}

/// Chain API double holding a fixed output set per account.
#[derive(Default)]
pub struct MockChain {
    utxos: Mutex<HashMap<String, Vec<UnspentOutput>>>,
}

impl MockChain {
    /// Credits `values` to the wallet's external addresses starting at 1000.
    pub fn fund(&self, wallet: &PledgerWallet, seed: u8, values: &[u64]) {
        let xpub = wallet.account_xpub();
        let utxos = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let index = 1_000 + i as u32;
                UnspentOutput {
                    txid: Txid::from_byte_array([seed; 32]),
                    output_index: i as u32,
                    locking_script: Address::p2pkh(
                        external_key_hash(&xpub, index).unwrap(),
                        NETWORK,
                    )
                    .script_pubkey(),
                    value: Amount::from_sat(*v),
                    derivation_path: role_path(DerivationRole::External, index).unwrap(),
                }
            })
            .collect();
        self.utxos.lock().insert(xpub.to_string(), utxos);
    }
}

#[async_trait]
impl ChainQuery for MockChain {
    async fn get_balance(&self, xpub: &Xpub) -> ClientResult<Amount> {
        Ok(self
            .utxos
            .lock()
            .get(&xpub.to_string())
            .map(|utxos| utxos.iter().map(|u| u.value).sum())
            .unwrap_or(Amount::ZERO))
    }

    async fn get_unspent(&self, xpub: &Xpub) -> ClientResult<Vec<UnspentOutput>> {
        Ok(self
            .utxos
            .lock()
            .get(&xpub.to_string())
            .cloned()
            .unwrap_or_default())
    }
}

/// Broadcast double that accepts a transaction unless one of its inputs was
/// already spent by an accepted one.
#[derive(Default)]
pub struct MockBroadcaster {
    accepted: Mutex<Vec<Transaction>>,
    attempts: Mutex<Vec<Transaction>>,
    spent: Mutex<HashSet<OutPoint>>,
    reject_next: Mutex<usize>,
}

impl MockBroadcaster {
    pub fn reject_next(&self, count: usize) {
        *self.reject_next.lock() = count;
    }

    pub fn accepted(&self) -> Vec<Transaction> {
        self.accepted.lock().clone()
    }

    pub fn attempts(&self) -> Vec<Transaction> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn send_tx(&self, tx: &Transaction) -> ClientResult<BroadcastResponse> {
        self.attempts.lock().push(tx.clone());
        {
            let mut reject = self.reject_next.lock();
            if *reject > 0 {
                *reject -= 1;
                return Ok(BroadcastResponse::new(500, "mempool full"));
            }
        }

        let mut spent = self.spent.lock();
        if tx.input.iter().any(|i| spent.contains(&i.previous_output)) {
            return Ok(BroadcastResponse::new(
                500,
                "bad-txns-inputs-missingorspent",
            ));
        }
        spent.extend(tx.input.iter().map(|i| i.previous_output));
        self.accepted.lock().push(tx.clone());
        Ok(BroadcastResponse::accepted())
    }
}

pub struct Harness {
    _dir: TempDir,
    pub db: Arc<SledBackend>,
    pub chain: Arc<MockChain>,
    pub broadcaster: Arc<MockBroadcaster>,
    pub service: Arc<PledgeService<SledBackend>>,
    pub project: ProjectId,
    pub creator: PledgerWallet,
}

pub fn keys(seed: u8) -> PledgerKeys {
    let master = Xpriv::new_master(NETWORK, &[seed; 32]).unwrap();
    PledgerKeys::new(&master, NETWORK).unwrap()
}

pub fn wallet(seed: u8) -> PledgerWallet {
    PledgerWallet::new(keys(seed))
}

fn require_regtest(address: &str) -> Address {
    address
        .parse::<Address<NetworkUnchecked>>()
        .unwrap()
        .require_network(NETWORK)
        .unwrap()
}

/// Claims `draft`'s locked output for the project in `reply`, signed with
/// `sighash_type` instead of the `ALL|ANYONECANPAY` the wallet uses.
pub fn sign_partial_as(
    seed: u8,
    external_index: u32,
    draft: &PledgeDraft,
    reply: &TransmitExactAmountResponse,
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
            value: Amount::from_sat(reply.fund_goal),
            script_pubkey: require_regtest(&reply.address).script_pubkey(),
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
    let spend = ContractSpend::Claim {
        secret: reply.secret.clone(),
    };
    tx.input[0].script_sig = spend
        .script_sig(&contract, &signature, &key.public_key(&secp))
        .unwrap();
    tx.input.remove(0)
}

pub fn params() -> PledgeParams {
    PledgeParams::new(
        NETWORK,
        &PledgeConfig {
            min_fee_sats: MIN_FEE.to_sat(),
            refund_locktime_offset_secs: REFUND_OFFSET,
        },
    )
}

impl Harness {
    /// Fresh database with one open project of `goal`.
    pub fn new(goal: Amount) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = open_sled_backend(dir.path(), "campaign", SledDbConfig::test()).unwrap();
        let chain = Arc::new(MockChain::default());
        let broadcaster = Arc::new(MockBroadcaster::default());
        let clock = Arc::new(TokioClock::starting_at(NOW));

        let refunds = RefundScheduler::new(
            db.clone(),
            broadcaster.clone(),
            clock.clone(),
            RefundSchedulerConfig {
                max_retries: 3,
                retry_backoff: Duration::from_secs(3_600),
            },
        );
        let service = Arc::new(PledgeService::new(
            db.clone(),
            chain.clone(),
            broadcaster.clone(),
            clock.clone(),
            refunds,
            params(),
        ));

        let creator = wallet(0xc0);
        let creator_id = register_user(db.as_ref(), &creator.account_xpub()).unwrap();
        let project = create_project(
            db.as_ref(),
            clock.as_ref(),
            NETWORK,
            NewProject {
                creator: creator_id,
                title: "village well".to_string(),
                fund_goal: goal,
                deadline: Utc.timestamp_opt(DEADLINE as i64, 0).unwrap(),
            },
            &mut StdRng::seed_from_u64(7),
        )
        .unwrap();

        Self {
            _dir: dir,
            db,
            chain,
            broadcaster,
            service,
            project,
            creator,
        }
    }

    /// Registers a funded pledger.
    pub fn pledger(&self, seed: u8, funds: &[u64]) -> (UserId, PledgerWallet) {
        let wallet = wallet(seed);
        self.chain.fund(&wallet, seed, funds);
        let user = register_user(self.db.as_ref(), &wallet.account_xpub()).unwrap();
        (user, wallet)
    }

    pub async fn initial(&self, user: UserId, amount: Amount) -> PledgeResult<InitialResponse> {
        match self
            .service
            .handle(user, self.project, PledgeRequest::Initial {
                amount: amount.to_sat(),
            })
            .await?
        {
            PledgeResponse::Initial(quote) => Ok(quote),
            other => panic!("unexpected response {other:?}"),
        }
    }

    pub async fn lock(
        &self,
        user: UserId,
        draft: &PledgeDraft,
    ) -> PledgeResult<TransmitExactAmountResponse> {
        match self
            .service
            .handle(user, self.project, draft.lock_request())
            .await?
        {
            PledgeResponse::TransmitExactAmount(reply) => Ok(reply),
            other => panic!("unexpected response {other:?}"),
        }
    }

    pub async fn submit_partial(
        &self,
        user: UserId,
        draft: &PledgeDraft,
        reply: &TransmitExactAmountResponse,
    ) -> PledgeResult<PartialStatus> {
        self.send_partial(user, draft.partial_request(reply).unwrap()).await
    }

    /// Submits `input` in place of the wallet's own partial.
    pub async fn submit_input(
        &self,
        user: UserId,
        draft: &PledgeDraft,
        input: &TxIn,
    ) -> PledgeResult<PartialStatus> {
        let request =
            PledgeRequest::transmit_partial(input, draft.amount().to_sat(), draft.refund_tx());
        self.send_partial(user, request).await
    }

    async fn send_partial(
        &self,
        user: UserId,
        request: PledgeRequest,
    ) -> PledgeResult<PartialStatus> {
        match self.service.handle(user, self.project, request).await? {
            PledgeResponse::TransmitPartial(status) => Ok(status),
            other => panic!("unexpected response {other:?}"),
        }
    }

    /// Runs the first two stages.
    pub async fn lock_pledge(
        &self,
        user: UserId,
        wallet: &PledgerWallet,
        amount: Amount,
    ) -> (PledgeDraft, TransmitExactAmountResponse) {
        let quote = self.initial(user, amount).await.unwrap();
        let draft = wallet.lock_funds(&quote, amount).unwrap();
        let reply = self.lock(user, &draft).await.unwrap();
        (draft, reply)
    }

    /// Transactions accepted by the broadcaster that pay the project.
    pub fn funding_txs(&self) -> Vec<Transaction> {
        let info = self.service.project_info(self.project).unwrap();
        let payout = require_regtest(&info.address).script_pubkey();
        self.broadcaster
            .accepted()
            .into_iter()
            .filter(|tx| tx.output.iter().any(|o| o.script_pubkey == payout))
            .collect()
    }
}
