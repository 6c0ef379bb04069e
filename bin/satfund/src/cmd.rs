//! Subcommand execution.

use std::{env, fs, path::Path, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use bitcoin::{bip32::Xpub, Amount, Network, NetworkKind};
use rand::rngs::OsRng;
use satfund_btcio::{HttpChainClient, RefundScheduler, RefundSchedulerConfig};
use satfund_campaign::{
    create_project, get_project_info, parse_deadline, register_user, FundingStatus, NewProject,
    PledgeParams, PledgeService,
};
use satfund_common::logging::{self, LoggingInitConfig};
use satfund_config::{Config, LoggingConfig};
use satfund_db_store_sled::{open_sled_backend, SledBackend, SledDbConfig, SLED_NAME};
use satfund_key_derivation::{account_xpub, generate_seed_phrase, parse_seed_phrase};
use satfund_primitives::{
    ids::{ProjectId, UserId},
    time::{Clock, SystemClock},
};
use tokio::signal::ctrl_c;
use tracing::*;
use zeroize::Zeroizing;

use crate::{
    args::{
        Args, SubcCompile, SubcCreateProject, SubcGenSeed, SubcInfo, SubcRegister, SubcRun,
        SubcXpub, Subcommand,
    },
    serve::serve_stdin,
};

/// Network used when neither the command line nor a config names one.
const DEFAULT_NETWORK: Network = Network::Regtest;

#[derive(Debug)]
pub(crate) struct CmdContext {
    config: Option<Config>,
    network: Network,
}

impl CmdContext {
    fn config(&self) -> anyhow::Result<&Config> {
        self.config
            .as_ref()
            .context("this command needs a config file, pass it with -c")
    }
}

pub(crate) fn resolve_context(args: Args) -> anyhow::Result<(CmdContext, Subcommand)> {
    let mut config = args.config.as_deref().map(load_config).transpose()?;
    let network = match (args.bitcoin_network.as_deref(), &config) {
        (Some(name), _) => resolve_network(name)?,
        (None, Some(config)) => config.bitcoin.network,
        (None, None) => DEFAULT_NETWORK,
    };
    if let Some(config) = config.as_mut() {
        config.bitcoin.network = network;
    }
    Ok((CmdContext { config, network }, args.subc))
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: Config =
        toml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))?;
    if let Err(e) = config.validate() {
        anyhow::bail!("invalid config {}: {e}", path.display());
    }
    Ok(config)
}

fn resolve_network(name: &str) -> anyhow::Result<Network> {
    Network::from_str(name).map_err(|_| anyhow::anyhow!("unsupported network option: {name}"))
}

pub(crate) fn init_logging(ctx: &CmdContext) {
    let default_logging = LoggingConfig::default();
    let lconfig = ctx
        .config
        .as_ref()
        .map(|c| &c.logging)
        .unwrap_or(&default_logging);

    logging::init_logging_from_config(LoggingInitConfig {
        service_base_name: "satfund",
        service_label: lconfig.service_label.as_deref(),
        log_dir: lconfig.log_dir.as_ref(),
        log_file_prefix: lconfig.log_file_prefix.as_deref(),
        json_format: lconfig.json_format,
        default_log_prefix: "satfund",
    });
}

pub(crate) async fn exec_subc(cmd: Subcommand, ctx: CmdContext) -> anyhow::Result<()> {
    match cmd {
        Subcommand::GenSeed(subc) => exec_genseed(subc),
        Subcommand::Xpub(subc) => exec_xpub(subc, &ctx),
        Subcommand::Register(subc) => exec_register(subc, &ctx),
        Subcommand::CreateProject(subc) => exec_create_project(subc, &ctx),
        Subcommand::Info(subc) => exec_info(subc, &ctx),
        Subcommand::Compile(subc) => exec_compile(subc, &ctx).await,
        Subcommand::Run(subc) => exec_run(subc, &ctx).await,
    }
}

/// Writes a fresh seed phrase to a file. Never prints it.
fn exec_genseed(cmd: SubcGenSeed) -> anyhow::Result<()> {
    if cmd.path.exists() && !cmd.force {
        anyhow::bail!("not overwriting file, add --force to overwrite");
    }

    let mnemonic = generate_seed_phrase(&mut OsRng)?;
    let phrase = Zeroizing::new(mnemonic.to_string());
    fs::write(&cmd.path, phrase.as_bytes())
        .with_context(|| format!("failed to write to file {:?}", cmd.path))?;
    Ok(())
}

fn exec_xpub(cmd: SubcXpub, ctx: &CmdContext) -> anyhow::Result<()> {
    let phrase = Zeroizing::new(
        fs::read_to_string(&cmd.path)
            .with_context(|| format!("failed to read seed phrase {:?}", cmd.path))?,
    );
    let passphrase = match &cmd.passphrase_env {
        Some(var) => Zeroizing::new(
            env::var(var).with_context(|| format!("passphrase variable {var} unset"))?,
        ),
        None => Zeroizing::new(String::new()),
    };

    let mnemonic = parse_seed_phrase(&phrase)?;
    let xpub = account_xpub(&mnemonic, &passphrase, ctx.network)?;
    println!("{xpub}");
    Ok(())
}

fn open_db(config: &Config) -> anyhow::Result<Arc<SledBackend>> {
    let ops_config = SledDbConfig::new(config.db.retry_count, config.db.retry_delay_ms);
    open_sled_backend(&config.client.datadir, SLED_NAME, ops_config)
}

fn exec_register(cmd: SubcRegister, ctx: &CmdContext) -> anyhow::Result<()> {
    let db = open_db(ctx.config()?)?;
    let xpub = Xpub::from_str(cmd.xpub.trim()).context("invalid xpub")?;
    if xpub.network != NetworkKind::from(ctx.network) {
        anyhow::bail!("xpub is not for {}", ctx.network);
    }

    let id = register_user(db.as_ref(), &xpub)?;
    db.flush()?;
    println!("{}", id.inner());
    Ok(())
}

fn exec_create_project(cmd: SubcCreateProject, ctx: &CmdContext) -> anyhow::Result<()> {
    let db = open_db(ctx.config()?)?;
    let project = NewProject {
        creator: UserId::new(cmd.creator),
        title: cmd.title,
        fund_goal: Amount::from_sat(cmd.goal),
        deadline: parse_deadline(&cmd.deadline)?,
    };

    let id = create_project(db.as_ref(), &SystemClock, ctx.network, project, &mut OsRng)?;
    db.flush()?;
    println!("{}", id.inner());
    Ok(())
}

fn exec_info(cmd: SubcInfo, ctx: &CmdContext) -> anyhow::Result<()> {
    let db = open_db(ctx.config()?)?;
    let info = get_project_info(db.as_ref(), ProjectId::new(cmd.project), ctx.network)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// Wires storage, the chain API and the refund scheduler into a service.
fn build_service(config: &Config) -> anyhow::Result<Arc<PledgeService<SledBackend>>> {
    let db = open_db(config)?;
    let client = Arc::new(HttpChainClient::new(
        &config.chain_api.base_url,
        config.chain_api.request_timeout(),
    )?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let refunds = RefundScheduler::new(
        db.clone(),
        client.clone(),
        clock.clone(),
        RefundSchedulerConfig {
            max_retries: config.refund.max_retries,
            retry_backoff: Duration::from_secs(config.refund.retry_backoff_secs),
        },
    );

    Ok(Arc::new(PledgeService::new(
        db,
        client.clone(),
        client,
        clock,
        refunds,
        PledgeParams::from_config(config),
    )))
}

async fn exec_compile(cmd: SubcCompile, ctx: &CmdContext) -> anyhow::Result<()> {
    let service = build_service(ctx.config()?)?;
    let project = ProjectId::new(cmd.project);

    match service.aggregator().try_compile(project).await? {
        FundingStatus::Funded(txid) => println!("funded {txid}"),
        FundingStatus::NotReady { pledged, goal } => {
            println!("not ready, {pledged} of {goal} sats pledged")
        }
    }
    service.db().flush()?;
    Ok(())
}

async fn exec_run(cmd: SubcRun, ctx: &CmdContext) -> anyhow::Result<()> {
    let config = ctx.config()?;
    let service = build_service(config)?;

    let restored = service.restore_refunds()?;
    info!(
        network = %config.bitcoin.network,
        datadir = %config.client.datadir.display(),
        chain_api = %config.chain_api.base_url,
        %restored,
        "satfund started"
    );

    if cmd.stdin {
        tokio::select! {
            res = serve_stdin(service.clone()) => res?,
            res = ctrl_c() => res?,
        }
    } else {
        ctrl_c().await?;
    }

    info!("shutting down");
    service.db().flush()?;
    Ok(())
}
