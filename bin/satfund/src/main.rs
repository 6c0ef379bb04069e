//! Crowdfunding service binary.
//!
//! Besides running the refund scheduler, it carries the operator commands for
//! seed phrases, user registration, project creation and manual aggregation.

mod args;
mod cmd;
mod serve;

use args::Args;
use cmd::{exec_subc, init_logging, resolve_context};
use tokio::runtime::Builder;

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e:?}");

        return Err(e);
    }

    Ok(())
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    let (ctx, subc) = resolve_context(args)?;

    // Init the logging before we do anything else.
    init_logging(&ctx);

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("satfund-rt")
        .build()?;

    runtime.block_on(exec_subc(subc, ctx))
}
