//! `virt-who`: collects host/guest association data from configured
//! virtualization sources and reports it to configured destinations.

mod cli;
mod env;
mod launcher;
mod logging;
mod print_client;

use std::collections::BTreeMap;

use clap::Parser;
use tracing::warn;

use virtwho_config::{resolve, EffectiveConfigInputs, KeyMaterial};
use virtwho_scheduler::TerminateFlag;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cli_options = cli.to_options();
    let (env_globals, env_non_globals, env_warnings) = env::from_process_env();

    // Logging is initialized before config resolution so warnings from
    // resolving the config are themselves visible; --debug from the CLI
    // takes priority over the config file's own [global] debug= setting,
    // which isn't known yet at this point -- an acceptable trade since the
    // CLI flag is the more explicit signal.
    let log_dir = if cli.log_to_file { Some(cli.log_dir.as_path()) } else { None };
    let _logging_guard = logging::init(cli.debug, log_dir);

    let mut warnings: Vec<String> = Vec::new();
    warnings.extend(env_warnings);
    warnings.extend(cli_options.warnings);

    let keyfile = if cli.keyfile.is_file() {
        match KeyMaterial::read_from_file(&cli.keyfile) {
            Ok(key) => Some(key),
            Err(e) => {
                warnings.push(format!("could not read keyfile {:?}: {e}", cli.keyfile));
                None
            }
        }
    } else {
        None
    };

    let inputs = EffectiveConfigInputs {
        main_config_path: Some(cli.config.clone()),
        drop_in_dir: Some(cli.config_dir.clone()),
        keyfile,
        env_globals,
        env_non_globals,
        cli_globals: cli_options.globals,
        cli_non_globals: cli_options.non_globals,
        cli_source_sections: BTreeMap::new(),
    };

    let (config, resolve_warnings) = match resolve(&inputs) {
        Ok(result) => result,
        Err(e) => {
            for w in &warnings {
                warn!("{w}");
            }
            tracing::error!("fatal: {e}");
            return Err(e.into());
        }
    };
    warnings.extend(resolve_warnings);
    for w in &warnings {
        warn!("{w}");
    }

    let external = TerminateFlag::new();
    let shutdown_flag = external.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_flag.set().await;
        }
    });

    launcher::run(config, external).await;
    Ok(())
}
