//! `DestinationInfo` derivation and the destination→source mapping (§3, §4.8).
//!
//! Each concrete `DestinationInfo` is a hashable value object built from a
//! source section's options; equality/hash over every option means two
//! sources naming the same destination collapse onto one destination worker.

use std::collections::BTreeMap;

use crate::section::ConfigSection;

/// A distinct delivery endpoint, derived from one source section's options.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DestinationInfo {
    Satellite5 {
        sat_server: String,
        sat_username: String,
        sat_password: String,
        filter_hosts: Vec<String>,
        exclude_hosts: Vec<String>,
    },
    Satellite6 {
        env: String,
        owner: String,
        rhsm_hostname: Option<String>,
        rhsm_port: Option<String>,
        rhsm_prefix: Option<String>,
        rhsm_username: Option<String>,
        rhsm_password: Option<String>,
        rhsm_proxy_hostname: Option<String>,
        rhsm_proxy_port: Option<String>,
        rhsm_proxy_user: Option<String>,
        rhsm_proxy_password: Option<String>,
        rhsm_insecure: bool,
    },
    /// Used when a source names no explicit destination (§3, §4.8).
    Default,
}

impl DestinationInfo {
    /// Attempts to build every known kind from `section`'s options,
    /// succeeding for a kind only when all of its required keys are
    /// present (§4.8). Returns the empty set for a source with no
    /// explicit destination; the caller attaches `DestinationInfo::Default`
    /// in that case.
    pub fn derive_all(section: &ConfigSection) -> Vec<DestinationInfo> {
        let mut out = Vec::new();
        if let (Some(server), Some(username), Some(password)) =
            (&section.sat_server, &section.sat_username, &section.sat_password)
        {
            out.push(DestinationInfo::Satellite5 {
                sat_server: server.clone(),
                sat_username: username.clone(),
                sat_password: password.clone(),
                filter_hosts: section.filter_hosts.clone(),
                exclude_hosts: section.exclude_hosts.clone(),
            });
        }
        if let (Some(env), Some(owner)) = (&section.env, &section.owner) {
            out.push(DestinationInfo::Satellite6 {
                env: env.clone(),
                owner: owner.clone(),
                rhsm_hostname: section.rhsm_hostname.clone(),
                rhsm_port: section.rhsm_port.clone(),
                rhsm_prefix: section.rhsm_prefix.clone(),
                rhsm_username: section.rhsm_username.clone(),
                rhsm_password: section.rhsm_password.clone(),
                rhsm_proxy_hostname: section.rhsm_proxy_hostname.clone(),
                rhsm_proxy_port: section.rhsm_proxy_port.clone(),
                rhsm_proxy_user: section.rhsm_proxy_user.clone(),
                rhsm_proxy_password: section.rhsm_proxy_password.clone(),
                rhsm_insecure: section.rhsm_insecure,
            });
        }
        out
    }

    pub fn is_satellite5(&self) -> bool {
        matches!(self, DestinationInfo::Satellite5 { .. })
    }
}

/// `{destination → source names}`, derived from every validated source
/// section (§4.8). Sources with no explicit destination are attached to
/// `DestinationInfo::Default`.
pub fn map_destinations_to_sources(sections: &[ConfigSection]) -> BTreeMap<DestinationInfo, Vec<String>> {
    let mut map: BTreeMap<DestinationInfo, Vec<String>> = BTreeMap::new();
    for section in sections {
        let dests = DestinationInfo::derive_all(section);
        if dests.is_empty() {
            map.entry(DestinationInfo::Default).or_default().push(section.name.clone());
            continue;
        }
        for dest in dests {
            map.entry(dest).or_default().push(section.name.clone());
        }
    }
    for sources in map.values_mut() {
        sources.sort();
        sources.dedup();
    }
    map
}

// `BTreeMap` needs a total order over keys; derive one that's stable and
// only used for map bucketing (not user-facing).
impl PartialOrd for DestinationInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DestinationInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        format!("{self:?}").cmp(&format!("{other:?}"))
    }
}
