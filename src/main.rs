use std::process;

use anyhow::Result;
use clap::Parser;
use log::{debug, error, LevelFilter};

use imap_checker::{
    backend::{Backend, ImapBackend},
    cli::Cli,
    config::Config,
    scorer::{SpamScorer, SpamcClient},
    triage,
};

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose))
        .format_timestamp(None)
        .init();

    if let Err(err) = run(&cli) {
        error!("{:#}", err);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::resolve(cli)?;
    debug!("scanning {} as {}", config.host, config.user);

    let mut scorer = SpamcClient::new(&cli.spamc);

    // The two connect paths yield sessions over different stream
    // types; everything past this point is generic over them.
    if config.ssl {
        let mut backend = ImapBackend::connect_tls(&config)?;
        let res = dispatch(&mut backend, &mut scorer, &config, cli.learn);
        backend.logout();
        res
    } else {
        let mut backend = ImapBackend::connect_plain(&config)?;
        let res = dispatch(&mut backend, &mut scorer, &config, cli.learn);
        backend.logout();
        res
    }
}

fn dispatch(
    backend: &mut impl Backend,
    scorer: &mut impl SpamScorer,
    config: &Config,
    learn: bool,
) -> Result<()> {
    if learn {
        triage::learn(backend, scorer, config)?;
    } else {
        triage::check(backend, scorer, config)?;
    }

    Ok(())
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
