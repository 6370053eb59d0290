//! Launcher glue (§4.9): builds the datastore, spawns one source worker per
//! configured section and one destination worker per distinct destination,
//! and waits for every worker to terminate.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{info, warn};

use virtwho_config::{map_destinations_to_sources, ConfigSection, DestinationInfo, EffectiveConfig, HypervisorType};
use virtwho_datastore::DataStore;
use virtwho_destination::{Batching, DestinationWorker, RhsmHttpClient, RhsmHttpConfig, Satellite5Config, Satellite5HttpClient};
use virtwho_filter::Filter;
use virtwho_scheduler::TerminateFlag;
use virtwho_source::{FakeSource, SourceWorker};

use crate::print_client::PrintClient;

/// Builds the filter for one owned source section (§4.4, §4.7).
fn filter_for(section: &ConfigSection) -> Filter {
    Filter::new(section.filter_hosts.clone(), section.exclude_hosts.clone(), section.filter_type)
}

fn rhsm_config(owner: &str, env: &str, section: Option<&ConfigSection>) -> RhsmHttpConfig {
    let hostname = section.and_then(|s| s.rhsm_hostname.clone()).unwrap_or_else(|| "subscription.rhsm.redhat.com".to_string());
    let port = section.and_then(|s| s.rhsm_port.clone()).unwrap_or_else(|| "443".to_string());
    let prefix = section.and_then(|s| s.rhsm_prefix.clone()).unwrap_or_else(|| "/subscription".to_string());
    RhsmHttpConfig {
        base_url: format!("https://{hostname}:{port}{prefix}"),
        owner: owner.to_string(),
        env: env.to_string(),
        username: section.and_then(|s| s.rhsm_username.clone()),
        password: section.and_then(|s| s.rhsm_password.clone()),
        insecure: section.map(|s| s.rhsm_insecure).unwrap_or(false),
    }
}

/// Spawns one source worker per configured section that has a runnable
/// adapter (today: only `type = fake` -- every other kind is an
/// out-of-scope external collaborator per §1, so its section is validated
/// and counted in the destination mapping but has no adapter to drive).
fn spawn_sources(
    config: &EffectiveConfig,
    datastore: &DataStore,
    external: &TerminateFlag,
    handles: &mut Vec<tokio::task::JoinHandle<()>>,
) {
    for (name, section) in &config.sections {
        if section.kind != HypervisorType::Fake {
            warn!(
                source = %name,
                kind = section.kind.as_str(),
                "no adapter available for this source type in this build, not spawning it"
            );
            continue;
        }
        let interval = Duration::from_secs(section.interval.unwrap_or(config.global.interval));
        let source = FakeSource::new(section.fake_file.clone().unwrap_or_default());
        let worker = SourceWorker::new(name.clone(), source, datastore.clone(), interval, config.global.oneshot)
            .with_status_mode(section.status);
        let internal = TerminateFlag::new();
        let external = external.clone();
        info!(source = %name, interval_secs = interval.as_secs(), "starting source worker");
        handles.push(tokio::spawn(virtwho_scheduler::run(worker, internal, external)));
    }
}

/// Spawns one destination worker per distinct destination in the
/// destination→source mapping (§4.8).
fn spawn_destinations(
    config: &EffectiveConfig,
    datastore: &DataStore,
    external: &TerminateFlag,
    handles: &mut Vec<tokio::task::JoinHandle<()>>,
) {
    let sections: Vec<ConfigSection> = config.sections.values().cloned().collect();
    let mapping = map_destinations_to_sources(&sections);

    for (index, (dest_info, source_names)) in mapping.into_iter().enumerate() {
        let filters: HashMap<String, Filter> = source_names
            .iter()
            .filter_map(|name| config.sections.get(name).map(|s| (name.clone(), filter_for(s))))
            .collect();
        let interval = Duration::from_secs(config.global.interval);
        let name = destination_name(&dest_info, index);
        let internal = TerminateFlag::new();
        let external = external.clone();
        let oneshot = config.global.oneshot;

        info!(destination = %name, sources = ?source_names, "starting destination worker");

        if config.global.print {
            let worker = DestinationWorker::new(name, PrintClient, Batching::Combined, source_names, filters, datastore.clone(), interval, oneshot);
            handles.push(tokio::spawn(virtwho_scheduler::run(worker, internal, external)));
            continue;
        }

        match &dest_info {
            DestinationInfo::Satellite5 { sat_server, sat_username, sat_password, .. } => {
                match Satellite5HttpClient::new(Satellite5Config {
                    server: sat_server.clone(),
                    username: sat_username.clone(),
                    password: sat_password.clone(),
                    insecure: false,
                }) {
                    Ok(client) => {
                        let worker = DestinationWorker::new(name, client, Batching::PerSource, source_names, filters, datastore.clone(), interval, oneshot);
                        handles.push(tokio::spawn(virtwho_scheduler::run(worker, internal, external)));
                    }
                    Err(e) => warn!(error = %e, "could not build Satellite-5 client, skipping destination"),
                }
            }
            DestinationInfo::Satellite6 {
                env,
                owner,
                rhsm_hostname,
                rhsm_port,
                rhsm_prefix,
                rhsm_username,
                rhsm_password,
                rhsm_insecure,
                ..
            } => {
                let hostname = rhsm_hostname.clone().unwrap_or_else(|| "subscription.rhsm.redhat.com".to_string());
                let port = rhsm_port.clone().unwrap_or_else(|| "443".to_string());
                let prefix = rhsm_prefix.clone().unwrap_or_else(|| "/subscription".to_string());
                let cfg = RhsmHttpConfig {
                    base_url: format!("https://{hostname}:{port}{prefix}"),
                    owner: owner.clone(),
                    env: env.clone(),
                    username: rhsm_username.clone(),
                    password: rhsm_password.clone(),
                    insecure: *rhsm_insecure,
                };
                match RhsmHttpClient::new(cfg) {
                    Ok(client) => {
                        let worker = DestinationWorker::new(name, client, Batching::Combined, source_names, filters, datastore.clone(), interval, oneshot);
                        handles.push(tokio::spawn(virtwho_scheduler::run(worker, internal, external)));
                    }
                    Err(e) => warn!(error = %e, "could not build subscription-manager client, skipping destination"),
                }
            }
            DestinationInfo::Default => {
                let owning_section = source_names.first().and_then(|n| config.sections.get(n));
                let owner = owning_section.and_then(|s| s.owner.clone()).unwrap_or_default();
                let env = owning_section.and_then(|s| s.env.clone()).unwrap_or_default();
                if owner.is_empty() || env.is_empty() {
                    warn!(destination = %name, "no owner/env configured for this destination, subscription-manager submissions will likely be rejected");
                }
                match RhsmHttpClient::new(rhsm_config(&owner, &env, owning_section)) {
                    Ok(client) => {
                        let worker = DestinationWorker::new(name, client, Batching::Combined, source_names, filters, datastore.clone(), interval, oneshot);
                        handles.push(tokio::spawn(virtwho_scheduler::run(worker, internal, external)));
                    }
                    Err(e) => warn!(error = %e, "could not build subscription-manager client, skipping destination"),
                }
            }
        }
    }
}

fn destination_name(dest_info: &DestinationInfo, index: usize) -> String {
    match dest_info {
        DestinationInfo::Satellite5 { sat_server, .. } => format!("sat5-{sat_server}"),
        DestinationInfo::Satellite6 { env, owner, .. } => format!("sam-{owner}-{env}"),
        DestinationInfo::Default => format!("default-{index}"),
    }
}

/// Creates the datastore, spawns every source and destination worker, and
/// waits for all of them to finish (either because every worker completed
/// its oneshot cycle, or because `external` was set by a shutdown signal).
pub async fn run(config: EffectiveConfig, external: TerminateFlag) {
    let datastore = DataStore::new();
    let mut handles = Vec::new();

    spawn_sources(&config, &datastore, &external, &mut handles);
    spawn_destinations(&config, &datastore, &external, &mut handles);

    if handles.is_empty() {
        warn!("no workers were started; nothing to do");
        return;
    }

    for handle in handles {
        let _ = handle.await;
    }
    info!("all workers stopped, exiting");
}
