//! Maps the `VIRTWHO_*` environment-variable contract (§6) onto the same
//! global/`env-cmdline` split the CLI layer produces.

use std::collections::BTreeMap;

use virtwho_config::effective::GLOBAL_KEYS;
use virtwho_config::HypervisorType;

const KNOWN_TYPES: &[&str] = &[
    "libvirt", "vdsm", "esx", "rhevm", "hyperv", "xen", "kubevirt", "ahv", "nutanix", "fake",
];

fn route(key: &str, value: String, globals: &mut BTreeMap<String, String>, non_globals: &mut BTreeMap<String, String>) {
    if GLOBAL_KEYS.contains(&key) {
        globals.insert(key.to_string(), value);
    } else {
        non_globals.insert(key.to_string(), value);
    }
}

/// Environment-derived global and `env/cmdline` key/value pairs. `vars` is
/// injectable so tests don't depend on the real process environment.
pub fn collect(vars: impl Fn(&str) -> Option<String>) -> (BTreeMap<String, String>, BTreeMap<String, String>, Vec<String>) {
    let mut globals = BTreeMap::new();
    let mut non_globals = BTreeMap::new();
    let mut warnings = Vec::new();

    if let Some(v) = vars("VIRTWHO_DEBUG") {
        route("debug", v, &mut globals, &mut non_globals);
    }
    if let Some(v) = vars("VIRTWHO_ONE_SHOT") {
        route("oneshot", v, &mut globals, &mut non_globals);
    }
    if let Some(v) = vars("VIRTWHO_INTERVAL") {
        route("interval", v, &mut globals, &mut non_globals);
    }
    if let Some(v) = vars("VIRTWHO_BACKGROUND") {
        route("background", v, &mut globals, &mut non_globals);
    }
    if let Some(v) = vars("VIRTWHO_SAM") {
        if truthy(&v) {
            globals.insert("sm_type".to_string(), "sam".to_string());
        }
    }
    if let Some(v) = vars("VIRTWHO_SATELLITE") {
        if truthy(&v) {
            globals.insert("sm_type".to_string(), "satellite".to_string());
        }
    }

    // Exactly one VIRTWHO_<TYPE> boolean is expected to be set at a time
    // (the legacy tool's single environment-configured source); the last
    // truthy one in KNOWN_TYPES order wins, with a warning on conflict.
    let mut chosen_type: Option<&str> = None;
    for ty in KNOWN_TYPES {
        let var = format!("VIRTWHO_{}", ty.to_ascii_uppercase());
        if let Some(v) = vars(&var) {
            if truthy(&v) {
                if let Some(existing) = chosen_type {
                    warnings.push(format!(
                        "both VIRTWHO_{} and VIRTWHO_{} are set; keeping {}",
                        existing.to_ascii_uppercase(),
                        ty.to_ascii_uppercase(),
                        ty
                    ));
                }
                chosen_type = Some(ty);
            }
        }
    }
    if let Some(ty) = chosen_type {
        non_globals.insert("type".to_string(), ty.to_string());
        debug_assert!(HypervisorType::parse(ty).is_some());
        for suffix in ["OWNER", "ENV", "SERVER", "USERNAME", "PASSWORD"] {
            let var = format!("VIRTWHO_{}_{suffix}", ty.to_ascii_uppercase());
            if let Some(v) = vars(&var) {
                non_globals.insert(suffix.to_ascii_lowercase(), v);
            }
        }
    }

    (globals, non_globals, warnings)
}

fn truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Reads the real process environment via [`std::env::var`].
pub fn from_process_env() -> (BTreeMap<String, String>, BTreeMap<String, String>, Vec<String>) {
    collect(|name| std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_env_var_is_routed_to_global() {
        let (globals, non_globals, _) = collect(|name| if name == "VIRTWHO_DEBUG" { Some("true".to_string()) } else { None });
        assert_eq!(globals.get("debug"), Some(&"true".to_string()));
        assert!(non_globals.is_empty());
    }

    #[test]
    fn esx_type_pulls_matching_suffixed_vars() {
        let (_, non_globals, _) = collect(|name| match name {
            "VIRTWHO_ESX" => Some("1".to_string()),
            "VIRTWHO_ESX_OWNER" => Some("acme".to_string()),
            "VIRTWHO_ESX_ENV" => Some("prod".to_string()),
            _ => None,
        });
        assert_eq!(non_globals.get("type"), Some(&"esx".to_string()));
        assert_eq!(non_globals.get("owner"), Some(&"acme".to_string()));
        assert_eq!(non_globals.get("env"), Some(&"prod".to_string()));
    }

    #[test]
    fn conflicting_type_vars_warn_and_keep_one() {
        let (_, non_globals, warnings) = collect(|name| match name {
            "VIRTWHO_ESX" => Some("1".to_string()),
            "VIRTWHO_XEN" => Some("1".to_string()),
            _ => None,
        });
        assert!(!warnings.is_empty());
        assert!(non_globals.contains_key("type"));
    }
}
