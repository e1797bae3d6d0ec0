pub mod autosave;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod day;
pub mod documents;
pub mod render;
pub mod report;
pub mod session;
pub mod task;
pub mod tracker;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting grit CLI"
    );
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.gritrc.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let options = cfg.tracker_options()?;
    let delay = cfg.autosave_delay()?;

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store = datastore::FileStore::open(&data_dir, &cfg.namespace()).with_context(|| {
        format!("failed to open datastore at {}", data_dir.display())
    })?;

    let mut session = session::Session::open(datastore::DataStore::new(store), options, delay)?;
    let loaded = session.loaded();
    if !loaded.failed.is_empty() {
        warn!(failed = ?loaded.failed, "some documents could not be loaded; using defaults");
    }

    let renderer = render::Renderer::new(&cfg)?;
    let inv = cli::Invocation::parse(&cfg, cli.rest)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = commands::dispatch(&mut session, &cfg, &renderer, inv, &mut out);

    finish(result, session.close())?;

    info!("done");
    Ok(())
}

/// The command's own failure wins; a close failure behind it is only logged.
fn finish(result: anyhow::Result<()>, closed: anyhow::Result<()>) -> anyhow::Result<()> {
    match (result, closed) {
        (Err(err), Err(close_err)) => {
            let close_err = format!("{close_err:#}");
            warn!(error = %close_err, "session did not close cleanly");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
        (Ok(()), closed) => closed,
    }
}
