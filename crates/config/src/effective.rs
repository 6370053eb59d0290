//! `EffectiveConfig`: layered resolution across built-in defaults, the main
//! config file, the drop-in directory, the environment, and the CLI (§4.1).

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::ini::{self, IniDocument};
use crate::password::KeyMaterial;
use crate::section::{ConfigSection, DEFAULT_INTERVAL, MINIMUM_SEND_INTERVAL};

pub const GLOBAL_SECTION: &str = "global";
pub const DEFAULTS_SECTION: &str = "defaults";
pub const ENV_CMDLINE_SECTION: &str = "env/cmdline";

/// Keys that are routed to the `global` section regardless of which layer
/// sets them (§4.1).
pub const GLOBAL_KEYS: &[&str] = &[
    "debug",
    "oneshot",
    "print",
    "background",
    "interval",
    "log_file",
    "log_dir",
    "reporter_id",
    "configs",
    "sm_type",
];

/// The validated `global` block (§3, §6).
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub debug: bool,
    pub oneshot: bool,
    pub print: bool,
    pub background: bool,
    pub interval: u64,
    pub reporter_id: String,
    pub log_file: Option<String>,
    pub log_dir: Option<String>,
    pub configs: Vec<PathBuf>,
    pub sm_type: Option<String>,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            debug: false,
            oneshot: false,
            print: false,
            background: false,
            interval: DEFAULT_INTERVAL,
            reporter_id: default_reporter_id(),
            log_file: None,
            log_dir: None,
            configs: Vec::new(),
            sm_type: None,
        }
    }
}

fn default_reporter_id() -> String {
    // The legacy tool seeds this from hostname + a random suffix; any
    // stable non-empty value satisfies the "non empty string" validator,
    // and the value is overridable from every layer above built-in
    // defaults.
    "virt-who".to_string()
}

impl GlobalOptions {
    /// Applies one `(key, value)` pair, clamping/parsing per §4.1 and
    /// recording a warning on any rejected value (silently falling back to
    /// the current value rather than erroring -- the global section is
    /// never fatal).
    pub fn apply(&mut self, key: &str, value: &str, warnings: &mut Vec<String>) {
        match key {
            "debug" => self.debug = parse_bool_or_warn(value, self.debug, "debug", warnings),
            "oneshot" => self.oneshot = parse_bool_or_warn(value, self.oneshot, "oneshot", warnings),
            "print" => self.print = parse_bool_or_warn(value, self.print, "print", warnings),
            "background" => self.background = parse_bool_or_warn(value, self.background, "background", warnings),
            "interval" => self.interval = parse_interval_or_warn(value, warnings),
            "reporter_id" => {
                if value.trim().is_empty() {
                    warnings.push("reporter_id must not be empty, keeping previous value".to_string());
                } else {
                    self.reporter_id = value.to_string();
                }
            }
            "log_file" => self.log_file = Some(value.to_string()),
            "log_dir" => self.log_dir = Some(value.to_string()),
            "configs" => self.configs.extend(value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(PathBuf::from)),
            "sm_type" => self.sm_type = Some(value.to_string()),
            _ => {}
        }
        if self.print {
            self.oneshot = true;
        }
    }
}

fn parse_bool_or_warn(value: &str, previous: bool, key: &str, warnings: &mut Vec<String>) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warnings.push(format!("[global] invalid boolean for {key}: {value:?}, keeping previous value"));
            previous
        }
    }
}

fn parse_interval_or_warn(value: &str, warnings: &mut Vec<String>) -> u64 {
    match value.trim().parse::<i64>() {
        Ok(v) if v >= MINIMUM_SEND_INTERVAL as i64 => v as u64,
        Ok(_) => {
            warnings.push(format!(
                "[global] interval can't be lower than {MINIMUM_SEND_INTERVAL} seconds, using default {DEFAULT_INTERVAL}"
            ));
            DEFAULT_INTERVAL
        }
        Err(_) => {
            warnings.push(format!(
                "[global] interval {value:?} is not a number, using default {DEFAULT_INTERVAL}"
            ));
            DEFAULT_INTERVAL
        }
    }
}

/// The fully resolved configuration: global options plus every source
/// section that survived validation (§3).
#[derive(Debug, Clone, Default)]
pub struct EffectiveConfig {
    pub global: GlobalOptions,
    pub sections: BTreeMap<String, ConfigSection>,
}

/// Everything the four input layers contribute, already split into
/// global/non-global by the caller (the CLI/env-var parsing layer in
/// `node`, per §4.1: "Global-scope keys ... are routed to the global
/// section; all other keys set from env/CLI land in a synthetic
/// `env/cmdline` section").
#[derive(Debug, Clone, Default)]
pub struct EffectiveConfigInputs {
    pub main_config_path: Option<PathBuf>,
    pub drop_in_dir: Option<PathBuf>,
    pub keyfile: Option<KeyMaterial>,
    pub env_globals: BTreeMap<String, String>,
    pub env_non_globals: BTreeMap<String, String>,
    pub cli_globals: BTreeMap<String, String>,
    pub cli_non_globals: BTreeMap<String, String>,
    /// Explicit named sections assembled by the CLI layer (e.g. `--fake`,
    /// `--source-opt TYPE.KEY=VALUE`); highest precedence, applied on top
    /// of whatever the file layers produced for the same section name.
    pub cli_source_sections: BTreeMap<String, BTreeMap<String, String>>,
}

/// Resolves the four-layer precedence into one `EffectiveConfig` (§4.1).
/// Per-section validation failures are dropped with a warning, not
/// propagated; the only hard error is "zero valid sections and nothing
/// given explicitly on the command line".
pub fn resolve(inputs: &EffectiveConfigInputs) -> Result<(EffectiveConfig, Vec<String>), ConfigError> {
    let mut warnings = Vec::new();
    let mut global = GlobalOptions::default();

    let main_doc = match &inputs.main_config_path {
        Some(path) if path.is_file() => {
            let (doc, parse_warnings) = ini::parse_file(path)?;
            warnings.extend(parse_warnings);
            Some(doc)
        }
        _ => None,
    };

    if let Some(doc) = &main_doc {
        if let Some(global_section) = doc.section(GLOBAL_SECTION) {
            for key in global_section.keys() {
                if let Some(value) = global_section.get(key) {
                    global.apply(key, value, &mut warnings);
                }
            }
        }
    }
    for (key, value) in &inputs.env_globals {
        global.apply(key, value, &mut warnings);
    }
    for (key, value) in &inputs.cli_globals {
        global.apply(key, value, &mut warnings);
    }

    let defaults_section = main_doc
        .as_ref()
        .and_then(|doc| doc.section(DEFAULTS_SECTION))
        .cloned();

    // §4.1: `--configs PATH` (one or more) restricts virt sections to just
    // those files, skipping the drop-in directory; `[global]`/`[defaults]`
    // from the main file remain in effect regardless.
    let mut raw_sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    if !global.configs.is_empty() {
        for path in &global.configs {
            if !path.is_file() {
                warnings.push(format!("configured file {path:?} is not accessible, skipping"));
                continue;
            }
            let (doc, parse_warnings) = ini::parse_file(path)?;
            warnings.extend(parse_warnings);
            merge_source_sections(&doc, &mut raw_sections);
        }
    } else {
        if let Some(doc) = &main_doc {
            merge_source_sections(doc, &mut raw_sections);
        }
        if let Some(dir) = &inputs.drop_in_dir {
            match ini::drop_in_files(dir) {
                Ok(files) => {
                    for path in files {
                        match ini::parse_file(&path) {
                            Ok((doc, parse_warnings)) => {
                                warnings.extend(parse_warnings);
                                merge_source_sections(&doc, &mut raw_sections);
                            }
                            Err(e) => warnings.push(format!("dropping unreadable drop-in file: {e}")),
                        }
                    }
                }
                Err(e) => warnings.push(format!("could not list drop-in directory {dir:?}: {e}")),
            }
        }
    }

    if let Some(defaults) = &defaults_section {
        for section in raw_sections.values_mut() {
            for key in defaults.keys() {
                section.entry(key.to_string()).or_insert_with(|| defaults.get(key).unwrap().to_string());
            }
        }
    }

    // env/cmdline: non-global keys from env and CLI land in one synthetic
    // section; if it ends up naming a `type`, it's validated like any
    // other source (§4.1).
    let mut env_cmdline: BTreeMap<String, String> = BTreeMap::new();
    env_cmdline.extend(inputs.env_non_globals.clone());
    env_cmdline.extend(inputs.cli_non_globals.clone());
    if !env_cmdline.is_empty() {
        raw_sections.insert(ENV_CMDLINE_SECTION.to_string(), env_cmdline);
    }

    // CLI-assembled explicit sections take precedence over everything else
    // for the same section name.
    for (name, overrides) in &inputs.cli_source_sections {
        let entry = raw_sections.entry(name.clone()).or_default();
        for (key, value) in overrides {
            entry.insert(key.clone(), value.clone());
        }
    }

    let mut sections = BTreeMap::new();
    for (name, raw) in raw_sections {
        if !raw.contains_key("type") {
            // A section with no `type` (e.g. leftover env/cmdline noise
            // with nothing source-shaped in it) isn't a source; skip
            // silently rather than producing a spurious validation error.
            continue;
        }
        match ConfigSection::validate(&name, raw, global.sm_type.as_deref(), inputs.keyfile.as_ref()) {
            Ok((section, section_warnings)) => {
                warnings.extend(section_warnings.into_iter().map(|w| format!("[{name}] {w}")));
                sections.insert(name, section);
            }
            Err(e) => warnings.push(format!("dropping section [{name}]: {e}")),
        }
    }

    if sections.is_empty() && inputs.cli_source_sections.is_empty() {
        return Err(ConfigError::NoValidSources);
    }

    Ok((EffectiveConfig { global, sections }, warnings))
}

fn merge_source_sections(doc: &IniDocument, into: &mut BTreeMap<String, BTreeMap<String, String>>) {
    for name in doc.source_section_names() {
        let section = doc.section(name).expect("name came from this doc");
        let entry = into.entry(name.to_string()).or_default();
        for key in section.keys() {
            entry.insert(key.to_string(), section.get(key).unwrap().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_configured() {
        let inputs = EffectiveConfigInputs::default();
        let err = resolve(&inputs).unwrap_err();
        assert!(matches!(err, ConfigError::NoValidSources));
    }

    #[test]
    fn cli_source_section_alone_is_sufficient() {
        let mut inputs = EffectiveConfigInputs::default();
        let mut fake = BTreeMap::new();
        fake.insert("type".to_string(), "fake".to_string());
        fake.insert("file".to_string(), "/tmp/fixture.json".to_string());
        inputs.cli_source_sections.insert("cli-fake".to_string(), fake);

        let (config, _) = resolve(&inputs).unwrap();
        assert!(config.sections.contains_key("cli-fake"));
        assert_eq!(config.global.interval, DEFAULT_INTERVAL);
    }

    #[test]
    fn env_global_interval_is_applied_and_clamped() {
        let mut inputs = EffectiveConfigInputs::default();
        inputs.env_globals.insert("interval".to_string(), "10".to_string());
        let mut fake = BTreeMap::new();
        fake.insert("type".to_string(), "fake".to_string());
        inputs.cli_source_sections.insert("f".to_string(), fake);

        let (config, warnings) = resolve(&inputs).unwrap();
        assert_eq!(config.global.interval, DEFAULT_INTERVAL);
        assert!(warnings.iter().any(|w| w.contains("interval")));
    }

    #[test]
    fn cli_global_beats_env_global() {
        let mut inputs = EffectiveConfigInputs::default();
        inputs.env_globals.insert("interval".to_string(), "120".to_string());
        inputs.cli_globals.insert("interval".to_string(), "180".to_string());
        let mut fake = BTreeMap::new();
        fake.insert("type".to_string(), "fake".to_string());
        inputs.cli_source_sections.insert("f".to_string(), fake);

        let (config, _) = resolve(&inputs).unwrap();
        assert_eq!(config.global.interval, 180);
    }

    #[test]
    fn print_forces_oneshot() {
        let mut inputs = EffectiveConfigInputs::default();
        inputs.cli_globals.insert("print".to_string(), "true".to_string());
        let mut fake = BTreeMap::new();
        fake.insert("type".to_string(), "fake".to_string());
        inputs.cli_source_sections.insert("f".to_string(), fake);

        let (config, _) = resolve(&inputs).unwrap();
        assert!(config.global.oneshot);
    }
}
