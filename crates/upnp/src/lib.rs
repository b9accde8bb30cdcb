//! A small UPnP Internet Gateway Device client.
//!
//! [`discover`] runs one SSDP sweep for WAN connection services and returns a [`Gateway`]
//! handle per responding router. Gateways expose the two control actions needed to manage
//! NAT port mappings: [`Gateway::add_port_mapping`] and [`Gateway::delete_port_mapping`].

use std::{collections::HashSet, time::Duration};

use anyhow::Context;
use futures::TryFutureExt;
use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use reqwest::Client;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{Instrument, debug, debug_span, warn};

mod description;
mod gateway;
mod local_ip;
mod protocol;
mod soap;
mod ssdp;

pub use description::{
    Device, DeviceList, RootDesc, Service, ServiceList, fetch_root_description,
    parse_root_description,
};
pub use gateway::Gateway;
pub use local_ip::get_local_ip_relative_to;
pub use protocol::{Protocol, UnknownProtocol};
pub use soap::{UpnpFault, make_soap_envelope, parse_upnp_fault};
pub use ssdp::{
    UpnpDiscoverResponse, discover_once, make_ssdp_search_request, parse_upnp_discover_response,
};

pub const SERVICE_TYPE_WAN_IP_CONNECTION: &str = "urn:schemas-upnp-org:service:WANIPConnection:1";
pub const SERVICE_TYPE_WAN_PPP_CONNECTION: &str =
    "urn:schemas-upnp-org:service:WANPPPConnection:1";

const SEARCH_TARGETS: [&str; 2] = [
    SERVICE_TYPE_WAN_IP_CONNECTION,
    SERVICE_TYPE_WAN_PPP_CONNECTION,
];

#[derive(Debug, Clone)]
pub struct IgdOptions {
    /// How long to collect SSDP answers for.
    pub discover_timeout: Duration,
    /// Log SOAP request and response bodies at debug level.
    pub log_exchanges: bool,
}

impl Default for IgdOptions {
    fn default() -> Self {
        Self {
            discover_timeout: Duration::from_secs(3),
            log_exchanges: false,
        }
    }
}

/// Logs the searches that failed and returns how many went out.
fn count_sent_searches<'a>(
    results: impl IntoIterator<Item = (&'a str, anyhow::Result<()>)>,
) -> usize {
    let mut sent = 0;
    for (st, result) in results {
        match result {
            Ok(()) => sent += 1,
            Err(e) => warn!(search_target = st, "error running SSDP discovery: {e:#}"),
        }
    }
    sent
}

/// Runs one discovery sweep and returns every gateway that exposes a WAN connection service.
///
/// The result is sorted by control URL so that repeated sweeps over the same network list
/// gateways in the same order. An empty result is not an error, and neither is a network
/// where the search requests cannot be sent at all.
pub async fn discover(opts: &IgdOptions) -> anyhow::Result<Vec<Gateway>> {
    let (tx, mut rx) = unbounded_channel();
    let results = futures::future::join_all(
        SEARCH_TARGETS
            .iter()
            .map(|st| discover_once(&tx, st, opts.discover_timeout)),
    )
    .await;
    drop(tx);
    if count_sent_searches(SEARCH_TARGETS.iter().copied().zip(results)) == 0 {
        warn!("no SSDP search could be sent, is the network up?");
        return Ok(Vec::new());
    }

    let mut seen = HashSet::new();
    let mut responses = Vec::new();
    while let Some(r) = rx.recv().await {
        if seen.insert(r.location.clone()) {
            responses.push(r);
        } else {
            debug!(location = %r.location, "duplicate SSDP response");
        }
    }
    if responses.is_empty() {
        return Ok(Vec::new());
    }

    let nics = NetworkInterface::show().context("error listing network interfaces")?;
    let client = Client::new();

    let endpoints = futures::future::join_all(responses.into_iter().map(|r| {
        let span = debug_span!("upnp_endpoint", location = %r.location);
        let client = &client;
        async move {
            let desc = fetch_root_description(client, &r.location).await?;
            anyhow::Ok((r, desc))
        }
        .inspect_err(|e| debug!("error parsing endpoint: {e:#}"))
        .instrument(span)
    }))
    .await;

    let mut gateways = Vec::new();
    for (r, desc) in endpoints.into_iter().flatten() {
        let local_ip = match get_local_ip_relative_to(r.received_from, &nics) {
            Ok(ip) => ip,
            Err(e) => {
                warn!(
                    "failed to determine local IP for endpoint at {}: {:#}",
                    r.location, e
                );
                continue;
            }
        };
        if let Some(gw) = Gateway::from_description(&r.location, &desc, local_ip, opts) {
            gateways.push(gw);
        }
    }

    gateways.sort_by(|a, b| a.control_url.cmp(&b.control_url));
    gateways.dedup_by(|a, b| a.control_url == b.control_url);
    debug!("discovered {} gateways", gateways.len());
    Ok(gateways)
}
