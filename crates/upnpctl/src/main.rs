use std::process::ExitCode;

use clap::Parser;
use upnpctl::{
    cli::{Opts, exit_code_for},
    device::UpnpDiscovery,
    dispatch::run,
    logging::init_logging,
};
use upnpctl_igd::IgdOptions;

fn main() -> anyhow::Result<ExitCode> {
    let opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            e.print()?;
            return Ok(ExitCode::from(exit_code_for(&e)));
        }
    };
    init_logging(opts.verbose)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .enable_io()
        .build()?;

    let discovery = UpnpDiscovery::new(IgdOptions {
        discover_timeout: opts.discover_timeout,
        log_exchanges: opts.verbose > 0,
    });

    let mut stdout = std::io::stdout().lock();
    match rt.block_on(run(&opts.subcommand, &discovery, &mut stdout)) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            drop(stdout);
            eprintln!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
