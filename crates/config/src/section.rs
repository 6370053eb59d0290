//! `ConfigSection`: a validated mapping of string keys to typed values for
//! one virtualization source or the `global`/`env/cmdline` blocks (§3, §4.1).

use std::collections::BTreeMap;

use virtwho_filter::FilterType;

use crate::error::ConfigError;
use crate::password::KeyMaterial;

/// Known hypervisor/source kinds (§4.1, §6). `VIRTWHO_TYPES` in the legacy
/// tool plus the out-of-scope adapters the spec still names (Kubernetes,
/// Nutanix, AHV) so section validation recognizes them even though their
/// collectors are out of scope for this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HypervisorType {
    Libvirt,
    Vdsm,
    Esx,
    Rhevm,
    Hyperv,
    Xen,
    Kubevirt,
    Ahv,
    Nutanix,
    Fake,
}

impl HypervisorType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "libvirt" => Some(Self::Libvirt),
            "vdsm" => Some(Self::Vdsm),
            "esx" => Some(Self::Esx),
            "rhevm" => Some(Self::Rhevm),
            "hyperv" => Some(Self::Hyperv),
            "xen" => Some(Self::Xen),
            "kubevirt" => Some(Self::Kubevirt),
            "ahv" => Some(Self::Ahv),
            "nutanix" => Some(Self::Nutanix),
            "fake" => Some(Self::Fake),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Libvirt => "libvirt",
            Self::Vdsm => "vdsm",
            Self::Esx => "esx",
            Self::Rhevm => "rhevm",
            Self::Hyperv => "hyperv",
            Self::Xen => "xen",
            Self::Kubevirt => "kubevirt",
            Self::Ahv => "ahv",
            Self::Nutanix => "nutanix",
            Self::Fake => "fake",
        }
    }

    /// Whether this type's `server` option defaults to empty instead of
    /// being required (§4.1: "libvirt/vdsm/fake").
    fn server_optional(self) -> bool {
        matches!(self, Self::Libvirt | Self::Vdsm | Self::Fake)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    NeedsValidation,
    Valid,
    Invalid,
}

/// Minimum accepted `interval`, in seconds (§4.1, §6).
pub const MINIMUM_SEND_INTERVAL: u64 = 60;
/// Default `interval` substituted when the configured value is missing or
/// below `MINIMUM_SEND_INTERVAL` (§4.1).
pub const DEFAULT_INTERVAL: u64 = 3600;
/// Spacing floor for destination job polling (§4.7).
pub const MINIMUM_JOB_POLL_INTERVAL_SECS: u64 = 5;

/// One `[section]` of the effective configuration, after validation.
/// `raw` retains every key actually supplied (for unknown-key warnings and
/// destination-info derivation); the named fields below hold the validated,
/// normalized values a worker actually consumes.
#[derive(Debug, Clone)]
pub struct ConfigSection {
    pub name: String,
    pub kind: HypervisorType,
    pub raw: BTreeMap<String, String>,
    pub state: ValidationState,

    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub owner: Option<String>,
    pub env: Option<String>,
    pub sm_type: Option<String>,

    pub hypervisor_id: String,
    pub filter_hosts: Vec<String>,
    pub exclude_hosts: Vec<String>,
    pub filter_type: FilterType,
    pub filter_host_parents: Vec<String>,
    pub exclude_host_parents: Vec<String>,

    pub simplified_vim: bool,
    pub is_hypervisor: bool,
    pub fake_file: Option<String>,

    pub rhsm_username: Option<String>,
    pub rhsm_password: Option<String>,
    pub rhsm_hostname: Option<String>,
    pub rhsm_port: Option<String>,
    pub rhsm_prefix: Option<String>,
    pub rhsm_proxy_hostname: Option<String>,
    pub rhsm_proxy_port: Option<String>,
    pub rhsm_proxy_user: Option<String>,
    pub rhsm_proxy_password: Option<String>,
    pub rhsm_insecure: bool,

    pub sat_server: Option<String>,
    pub sat_username: Option<String>,
    pub sat_password: Option<String>,

    pub interval: Option<u64>,
    pub status: bool,
    pub log_file: Option<String>,
    pub log_dir: Option<String>,
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            let s = s.trim();
            if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
                s[1..s.len() - 1].to_string()
            } else {
                s.to_string()
            }
        })
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_filter_type(raw: Option<&str>) -> FilterType {
    match raw.map(|s| s.to_ascii_lowercase()) {
        Some(ref s) if s == "wildcards" => FilterType::Wildcards,
        Some(ref s) if s == "regex" => FilterType::Regex,
        _ => FilterType::Auto,
    }
}

impl ConfigSection {
    /// Builds a section straight from its raw keys, performing type-lookup,
    /// list/bool parsing, password decryption, latin1/utf8 checks, URL
    /// normalization, and the `sm_type=sam` cross-check (§4.1). Returns
    /// warnings alongside the validated section; a `ConfigError` means the
    /// whole section must be dropped.
    pub fn validate(
        name: &str,
        raw: BTreeMap<String, String>,
        sm_type: Option<&str>,
        keyfile: Option<&KeyMaterial>,
    ) -> Result<(Self, Vec<String>), ConfigError> {
        let mut warnings = Vec::new();

        let type_str = raw.get("type").ok_or_else(|| ConfigError::MissingKey {
            section: name.to_string(),
            key: "type".to_string(),
        })?;
        let kind = HypervisorType::parse(type_str).ok_or_else(|| ConfigError::UnknownHypervisorType {
            section: name.to_string(),
            kind: type_str.clone(),
        })?;

        let server = match raw.get("server") {
            Some(s) => s.clone(),
            None if kind.server_optional() => String::new(),
            None => {
                return Err(ConfigError::MissingKey {
                    section: name.to_string(),
                    key: "server".to_string(),
                })
            }
        };
        let server = normalize_server_url(kind, &server, &mut warnings);

        let username = raw.get("username").cloned();
        if let Some(u) = &username {
            check_latin1(name, "username", u)?;
        }

        let password = resolve_password(name, &raw, "password", "encrypted_password", keyfile)?;
        if let Some(p) = &password {
            check_utf8(name, "password", p)?;
        }

        let owner = raw.get("owner").cloned();
        let env = raw.get("env").cloned();

        let hypervisor_id = raw
            .get("hypervisor_id")
            .cloned()
            .unwrap_or_else(|| "uuid".to_string());
        if !matches!(hypervisor_id.as_str(), "uuid" | "hostname" | "hwuuid") {
            warnings.push(format!(
                "[{name}] unknown hypervisor_id {hypervisor_id:?}, expected one of uuid/hostname/hwuuid"
            ));
        }

        let filter_hosts = raw
            .get("filter_hosts")
            .or_else(|| raw.get("filter_host_uuids"))
            .map(|s| parse_list(s))
            .unwrap_or_default();
        let exclude_hosts = raw
            .get("exclude_hosts")
            .or_else(|| raw.get("exclude_host_uuids"))
            .map(|s| parse_list(s))
            .unwrap_or_default();
        let filter_type = parse_filter_type(raw.get("filter_type").map(|s| s.as_str()));

        let filter_host_parents = raw.get("filter_host_parents").map(|s| parse_list(s));
        let exclude_host_parents = raw.get("exclude_host_parents").map(|s| parse_list(s));
        if kind != HypervisorType::Esx {
            if filter_host_parents.is_some() {
                warnings.push(format!(
                    "[{name}] filter_host_parents is not supported in {} mode, ignoring it",
                    kind.as_str()
                ));
            }
            if exclude_host_parents.is_some() {
                warnings.push(format!(
                    "[{name}] exclude_host_parents is not supported in {} mode, ignoring it",
                    kind.as_str()
                ));
            }
        }

        let simplified_vim = raw
            .get("simplified_vim")
            .and_then(|s| parse_bool(s))
            .unwrap_or(true);

        let is_hypervisor = raw
            .get("is_hypervisor")
            .and_then(|s| parse_bool(s))
            .unwrap_or(true);
        if kind != HypervisorType::Fake && raw.contains_key("is_hypervisor") {
            warnings.push(format!(
                "[{name}] is_hypervisor is not supported in {} mode, ignoring it",
                kind.as_str()
            ));
        }
        let fake_file = raw.get("file").cloned();

        let rhsm_username = raw.get("rhsm_username").cloned();
        let rhsm_password = resolve_password(name, &raw, "rhsm_password", "rhsm_encrypted_password", keyfile)?;
        let rhsm_hostname = raw.get("rhsm_hostname").cloned();
        let rhsm_port = raw.get("rhsm_port").cloned();
        let rhsm_prefix = raw.get("rhsm_prefix").cloned();
        let rhsm_proxy_hostname = raw.get("rhsm_proxy_hostname").cloned();
        let rhsm_proxy_port = raw.get("rhsm_proxy_port").cloned();
        let rhsm_proxy_user = raw.get("rhsm_proxy_user").cloned();
        let rhsm_proxy_password = resolve_password(
            name,
            &raw,
            "rhsm_proxy_password",
            "rhsm_encrypted_proxy_password",
            keyfile,
        )?;
        let rhsm_insecure = raw.get("rhsm_insecure").and_then(|s| parse_bool(s)).unwrap_or(false);

        let sat_server = raw.get("sat_server").cloned();
        let sat_username = raw.get("sat_username").cloned();
        let sat_password = resolve_password(name, &raw, "sat_password", "sat_encrypted_password", keyfile)?;

        let interval = match raw.get("interval") {
            Some(s) => Some(validate_interval(s, &mut warnings, name)),
            None => None,
        };
        let status = raw.get("status").and_then(|s| parse_bool(s)).unwrap_or(false);
        let log_file = raw.get("log_file").cloned();
        let log_dir = raw.get("log_dir").cloned();

        let mut section = ConfigSection {
            name: name.to_string(),
            kind,
            raw,
            state: ValidationState::NeedsValidation,
            server,
            username,
            password,
            owner,
            env,
            sm_type: sm_type.map(|s| s.to_string()),
            hypervisor_id,
            filter_hosts,
            exclude_hosts,
            filter_type,
            filter_host_parents: filter_host_parents.unwrap_or_default(),
            exclude_host_parents: exclude_host_parents.unwrap_or_default(),
            simplified_vim,
            is_hypervisor,
            fake_file,
            rhsm_username,
            rhsm_password,
            rhsm_hostname,
            rhsm_port,
            rhsm_prefix,
            rhsm_proxy_hostname,
            rhsm_proxy_port,
            rhsm_proxy_user,
            rhsm_proxy_password,
            rhsm_insecure,
            sat_server,
            sat_username,
            sat_password,
            interval,
            status,
            log_file,
            log_dir,
        };

        section.check_sam_cross_reference(&mut warnings)?;
        section.state = ValidationState::Valid;

        Ok((section, warnings))
    }

    /// Whether this source is a "real hypervisor collector" for the
    /// purposes of the `sm_type=sam` owner/env cross-check (§4.1): anything
    /// other than local libvirt/vdsm, or a non-hypervisor fake.
    fn is_real_hypervisor_collector(&self) -> bool {
        match self.kind {
            HypervisorType::Esx
            | HypervisorType::Rhevm
            | HypervisorType::Hyperv
            | HypervisorType::Xen
            | HypervisorType::Kubevirt
            | HypervisorType::Ahv
            | HypervisorType::Nutanix => true,
            HypervisorType::Libvirt => !self.server.is_empty(),
            HypervisorType::Vdsm => false,
            HypervisorType::Fake => self.is_hypervisor,
        }
    }

    fn check_sam_cross_reference(&self, warnings: &mut Vec<String>) -> Result<(), ConfigError> {
        let sam_like = matches!(self.sm_type.as_deref(), None | Some("sam"));
        if sam_like && self.is_real_hypervisor_collector() {
            if self.env.is_none() {
                return Err(ConfigError::InvalidValue {
                    section: self.name.clone(),
                    key: "env".to_string(),
                    reason: "must be set for sm_type=sam hypervisor sources".to_string(),
                });
            }
            if self.owner.is_none() {
                return Err(ConfigError::InvalidValue {
                    section: self.name.clone(),
                    key: "owner".to_string(),
                    reason: "must be set for sm_type=sam hypervisor sources".to_string(),
                });
            }
        } else if self.kind == HypervisorType::Fake && !self.is_hypervisor {
            if self.env.is_some() {
                warnings.push(format!(
                    "[{}] option `env` is not used in non-hypervisor fake mode",
                    self.name
                ));
            }
            if self.owner.is_some() {
                warnings.push(format!(
                    "[{}] option `owner` is not used in non-hypervisor fake mode",
                    self.name
                ));
            }
        }
        Ok(())
    }
}

/// Clamps an `interval` value to `>= MINIMUM_SEND_INTERVAL`, falling back to
/// `DEFAULT_INTERVAL` with a warning on parse failure or an out-of-range
/// value (§4.1, §6, Open Question: `interval` is always a validated `u64`).
fn validate_interval(raw: &str, warnings: &mut Vec<String>, section: &str) -> u64 {
    match raw.trim().parse::<i64>() {
        Ok(v) if v >= MINIMUM_SEND_INTERVAL as i64 => v as u64,
        Ok(_) => {
            warnings.push(format!(
                "[{section}] interval can't be lower than {MINIMUM_SEND_INTERVAL} seconds, using default {DEFAULT_INTERVAL}"
            ));
            DEFAULT_INTERVAL
        }
        Err(_) => {
            warnings.push(format!(
                "[{section}] interval {raw:?} is not a number, using default {DEFAULT_INTERVAL}"
            ));
            DEFAULT_INTERVAL
        }
    }
}

fn check_latin1(section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
    if value.chars().any(|c| c as u32 > 0xFF) {
        return Err(ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            reason: "value is not Latin-1-encodable".to_string(),
        });
    }
    Ok(())
}

fn check_utf8(_section: &str, _key: &str, _value: &str) -> Result<(), ConfigError> {
    // `value` is already a Rust `String`, hence already valid UTF-8; this
    // exists to mirror the §4.1 validator list and to be the single place
    // that would reject non-UTF-8 bytes decrypted from a keyfile.
    Ok(())
}

/// Decrypts `encrypted_key` via the keyfile if `plain_key` is absent.
fn resolve_password(
    section: &str,
    raw: &BTreeMap<String, String>,
    plain_key: &str,
    encrypted_key: &str,
    keyfile: Option<&KeyMaterial>,
) -> Result<Option<String>, ConfigError> {
    if let Some(plain) = raw.get(plain_key) {
        return Ok(Some(plain.clone()));
    }
    if let Some(encrypted) = raw.get(encrypted_key) {
        let key = keyfile.ok_or_else(|| ConfigError::Decrypt(format!(
            "section [{section}] has {encrypted_key} set but no keyfile is available"
        )))?;
        let decrypted = crate::password::decrypt_hex_to_string(key, encrypted)?;
        return Ok(Some(decrypted));
    }
    Ok(None)
}

/// Libvirt: missing scheme defaults to `qemu+ssh://`, missing path defaults
/// to `/system`, and `?no_tty=1` is always appended. RHEV-M: normalized to
/// `https://HOST:8443/` when scheme or port are omitted. Xen: `https://`
/// prefix added when no scheme is given (§4.1).
fn normalize_server_url(kind: HypervisorType, server: &str, warnings: &mut Vec<String>) -> String {
    if server.is_empty() {
        return server.to_string();
    }
    match kind {
        HypervisorType::Libvirt => normalize_libvirt_url(server, warnings),
        HypervisorType::Rhevm => normalize_rhevm_url(server),
        HypervisorType::Xen => normalize_xen_url(server),
        _ => server.to_string(),
    }
}

fn normalize_libvirt_url(server: &str, warnings: &mut Vec<String>) -> String {
    let has_scheme = server.contains("://");
    let mut url = if has_scheme {
        server.to_string()
    } else {
        warnings.push(format!("libvirt url {server:?} has no scheme, defaulting to qemu+ssh://"));
        format!("qemu+ssh://{server}")
    };

    let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
    let after_scheme = &url[scheme_end..];
    let has_path = after_scheme.contains('/');
    if !has_path {
        url.push_str("/system");
    }
    if !url.contains("?no_tty=1") {
        if url.contains('?') {
            url.push_str("&no_tty=1");
        } else {
            url.push_str("?no_tty=1");
        }
    }
    url
}

fn normalize_rhevm_url(server: &str) -> String {
    let has_scheme = server.contains("://");
    let body = if has_scheme {
        server.splitn(2, "://").nth(1).unwrap_or(server)
    } else {
        server
    };
    let has_port = body.split('/').next().unwrap_or(body).contains(':');
    let host = body.trim_end_matches('/');
    if has_scheme && has_port {
        let mut s = server.to_string();
        if !s.ends_with('/') {
            s.push('/');
        }
        return s;
    }
    let host_only = host.split('/').next().unwrap_or(host);
    format!("https://{host_only}:8443/")
}

fn normalize_xen_url(server: &str) -> String {
    if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{server}")
    }
}
