//! Command line arguments for the `satfund` binary.

use std::path::PathBuf;

use argh::FromArgs;

/// Args.
#[derive(FromArgs)]
pub(crate) struct Args {
    #[argh(option, description = "path to the TOML config file", short = 'c')]
    pub(crate) config: Option<PathBuf>,

    #[argh(
        option,
        description = "network name [bitcoin, testnet, signet, regtest], overrides the config",
        short = 'b'
    )]
    pub(crate) bitcoin_network: Option<String>,

    #[argh(subcommand)]
    pub(crate) subc: Subcommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub(crate) enum Subcommand {
    GenSeed(SubcGenSeed),
    Xpub(SubcXpub),
    Register(SubcRegister),
    CreateProject(SubcCreateProject),
    Info(SubcInfo),
    Compile(SubcCompile),
    Run(SubcRun),
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "genseed",
    description = "generates a 24 word seed phrase and writes it to a file"
)]
pub(crate) struct SubcGenSeed {
    #[argh(positional, description = "output path")]
    pub(crate) path: PathBuf,

    #[argh(switch, description = "force overwrite", short = 'f')]
    pub(crate) force: bool,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "xpub",
    description = "prints the account xpub of a seed phrase"
)]
pub(crate) struct SubcXpub {
    #[argh(positional, description = "file holding the seed phrase")]
    pub(crate) path: PathBuf,

    #[argh(
        option,
        description = "environment variable holding the BIP-39 passphrase"
    )]
    pub(crate) passphrase_env: Option<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "register",
    description = "registers an account xpub and prints the new user id"
)]
pub(crate) struct SubcRegister {
    #[argh(positional, description = "account xpub")]
    pub(crate) xpub: String,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "create-project",
    description = "creates a project paying out to the creator"
)]
pub(crate) struct SubcCreateProject {
    #[argh(option, description = "creator user id")]
    pub(crate) creator: u64,

    #[argh(option, description = "project title")]
    pub(crate) title: String,

    #[argh(option, description = "funding goal in sats")]
    pub(crate) goal: u64,

    #[argh(option, description = "deadline, RFC 3339 or YYYY-MM-DD")]
    pub(crate) deadline: String,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "info",
    description = "prints a project's public details as JSON"
)]
pub(crate) struct SubcInfo {
    #[argh(positional, description = "project id")]
    pub(crate) project: u64,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "compile",
    description = "aggregates a project's pledges if they cover the goal"
)]
pub(crate) struct SubcCompile {
    #[argh(positional, description = "project id")]
    pub(crate) project: u64,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "run",
    description = "runs the refund scheduler and optionally serves pledge requests"
)]
pub(crate) struct SubcRun {
    #[argh(
        switch,
        description = "read JSON pledge requests from stdin, one per line"
    )]
    pub(crate) stdin: bool,
}
