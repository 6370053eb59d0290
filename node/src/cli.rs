//! `clap`-derived CLI surface (§4.10, §6). Every flag lowers to a
//! `(section, key, value)` triple feeding the same `env/cmdline` section
//! that the environment layer writes to, so CLI and environment share one
//! code path into `EffectiveConfig` resolution.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;

use virtwho_config::effective::GLOBAL_KEYS;

/// Virtualization inventory reporting daemon.
#[derive(Debug, Parser)]
#[command(name = "virt-who", version, about)]
pub struct Cli {
    /// Enable debug-level logging.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Run as a background daemon. Accepted for compatibility; this build
    /// leaves process daemonization to the process supervisor (systemd,
    /// etc.) rather than forking itself.
    #[arg(short = 'b', long)]
    pub background: bool,

    /// Run exactly one send cycle per worker, then exit.
    #[arg(short = 'o', long = "one-shot")]
    pub one_shot: bool,

    /// Wait interval between checks, in seconds (minimum 60).
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Print the reports that would be sent instead of sending them, then
    /// exit (implies --one-shot).
    #[arg(long)]
    pub print: bool,

    /// Main configuration file.
    #[arg(long, default_value = "/etc/virt-who.conf")]
    pub config: PathBuf,

    /// Drop-in configuration directory (`*.conf`, dotfiles ignored).
    #[arg(long = "config-dir", default_value = "/etc/virt-who.d")]
    pub config_dir: PathBuf,

    /// Restrict virt sections to these files, skipping the drop-in
    /// directory (§4.1). Repeatable.
    #[arg(long = "configs")]
    pub configs: Vec<PathBuf>,

    /// Password keyfile (mode 0600, two hex lines: key, iv).
    #[arg(long, default_value = "/var/lib/virt-who/key")]
    pub keyfile: PathBuf,

    /// Directory for log files, when file logging is enabled.
    #[arg(long, default_value = "/var/log/virtwho")]
    pub log_dir: PathBuf,

    /// Enable logging to a file under --log-dir in addition to stderr.
    #[arg(long)]
    pub log_to_file: bool,

    /// Destination selector: subscription-manager/SAM (sets sm_type=sam).
    #[arg(long)]
    pub sam: bool,

    /// Destination selector: Satellite 5 (sets sm_type=satellite).
    #[arg(long)]
    pub satellite: bool,

    /// Enable the bundled fake source, reading its fixture from --fake-file
    /// (or the fixture named by VIRTWHO_FAKE_FILE).
    #[arg(long)]
    pub fake: bool,

    /// Fixture file for --fake.
    #[arg(long = "fake-file")]
    pub fake_file: Option<PathBuf>,

    /// Ad-hoc source option, `TYPE.KEY=VALUE`. All KEY=VALUE pairs land in
    /// the synthetic `env/cmdline` section (§4.1); TYPE sets that section's
    /// `type` (the last `--source-opt` naming a TYPE wins, with a warning
    /// on conflict). Repeatable.
    #[arg(long = "source-opt", value_parser = parse_source_opt)]
    pub source_opts: Vec<(Option<String>, String, String)>,
}

fn parse_source_opt(raw: &str) -> Result<(Option<String>, String, String), String> {
    let (lhs, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE.KEY=VALUE, got {raw:?}"))?;
    match lhs.split_once('.') {
        Some((ty, key)) => Ok((Some(ty.to_string()), key.to_string(), value.to_string())),
        None => Ok((None, lhs.to_string(), value.to_string())),
    }
}

/// Splits one `(key, value)` into the global or env/cmdline bucket per
/// §4.1's "Global-scope keys ... are routed to the global section".
fn route(key: &str, value: String, globals: &mut BTreeMap<String, String>, non_globals: &mut BTreeMap<String, String>) {
    if GLOBAL_KEYS.contains(&key) {
        globals.insert(key.to_string(), value);
    } else {
        non_globals.insert(key.to_string(), value);
    }
}

/// CLI-derived global and `env/cmdline` key/value pairs.
pub struct CliOptions {
    pub globals: BTreeMap<String, String>,
    pub non_globals: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

impl Cli {
    pub fn to_options(&self) -> CliOptions {
        let mut globals = BTreeMap::new();
        let mut non_globals = BTreeMap::new();
        let mut warnings = Vec::new();

        if self.debug {
            route("debug", "true".to_string(), &mut globals, &mut non_globals);
        }
        if self.background {
            route("background", "true".to_string(), &mut globals, &mut non_globals);
        }
        if self.one_shot {
            route("oneshot", "true".to_string(), &mut globals, &mut non_globals);
        }
        if self.print {
            route("print", "true".to_string(), &mut globals, &mut non_globals);
        }
        if let Some(interval) = self.interval {
            route("interval", interval.to_string(), &mut globals, &mut non_globals);
        }
        if !self.configs.is_empty() {
            let joined = self
                .configs
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(",");
            route("configs", joined, &mut globals, &mut non_globals);
        }
        if self.log_to_file {
            route("log_dir", self.log_dir.to_string_lossy().into_owned(), &mut globals, &mut non_globals);
        }
        if self.sam {
            route("sm_type", "sam".to_string(), &mut globals, &mut non_globals);
        }
        if self.satellite {
            route("sm_type", "satellite".to_string(), &mut globals, &mut non_globals);
        }

        if self.fake {
            non_globals.insert("type".to_string(), "fake".to_string());
            if let Some(file) = &self.fake_file {
                non_globals.insert("file".to_string(), file.to_string_lossy().into_owned());
            }
        }

        let mut chosen_type: Option<String> = None;
        for (ty, key, value) in &self.source_opts {
            if let Some(ty) = ty {
                match &chosen_type {
                    Some(existing) if existing != ty => {
                        warnings.push(format!(
                            "--source-opt named conflicting types {existing:?} and {ty:?}; keeping {ty:?}"
                        ));
                    }
                    _ => {}
                }
                chosen_type = Some(ty.clone());
            }
            non_globals.insert(key.clone(), value.clone());
        }
        if let Some(ty) = chosen_type {
            non_globals.insert("type".to_string(), ty);
        }

        CliOptions { globals, non_globals, warnings }
    }
}
