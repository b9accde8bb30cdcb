use std::{net::IpAddr, time::Duration};

use reqwest::Client;
use tracing::{Instrument, Span, debug, debug_span};
use url::Url;

use crate::{
    IgdOptions, Protocol, SERVICE_TYPE_WAN_IP_CONNECTION, SERVICE_TYPE_WAN_PPP_CONNECTION,
    description::RootDesc, soap::call_action,
};

/// A WAN connection service of a discovered Internet Gateway Device.
#[derive(Debug, Clone)]
pub struct Gateway {
    /// UDN of the root device, e.g. "uuid:...".
    pub unique_id: String,
    pub friendly_name: String,
    pub location: Url,
    pub control_url: Url,
    pub service_type: String,
    /// Our address as seen from the gateway, used as the mapping target.
    pub local_ip: IpAddr,
    client: Client,
    log_exchanges: bool,
}

impl Gateway {
    /// Builds a handle from the first WANIPConnection or WANPPPConnection service found under
    /// the root device described at `location`.
    pub fn from_description(
        location: &Url,
        desc: &RootDesc,
        local_ip: IpAddr,
        opts: &IgdOptions,
    ) -> Option<Gateway> {
        let span = debug_span!("gateway", %location);
        for root in desc.devices.iter() {
            let found = root.iter_services(span.clone()).find(|(_, s)| {
                s.service_type == SERVICE_TYPE_WAN_IP_CONNECTION
                    || s.service_type == SERVICE_TYPE_WAN_PPP_CONNECTION
            });
            let Some((service_span, service)) = found else {
                continue;
            };
            let control_url = match location.join(&service.control_url) {
                Ok(url) => url,
                Err(e) => {
                    service_span.in_scope(|| debug!("bad control url: {e:#}"));
                    continue;
                }
            };
            return Some(Gateway {
                unique_id: root.udn.clone(),
                friendly_name: root.name().to_owned(),
                location: location.clone(),
                control_url,
                service_type: service.service_type.clone(),
                local_ip,
                client: Client::new(),
                log_exchanges: opts.log_exchanges,
            });
        }
        span.in_scope(|| debug!("no WAN connection service found"));
        None
    }

    fn span(&self) -> Span {
        debug_span!("gateway", control_url = %self.control_url)
    }

    /// Adds (or replaces) a mapping of `external_port` on the gateway to `internal_port` on
    /// this host. A zero `lease_duration` asks for a permanent mapping.
    pub async fn add_port_mapping(
        &self,
        protocol: Protocol,
        external_port: u16,
        internal_port: u16,
        description: &str,
        lease_duration: Duration,
    ) -> anyhow::Result<()> {
        let args = [
            ("NewRemoteHost", String::new()),
            ("NewExternalPort", external_port.to_string()),
            ("NewProtocol", protocol.to_string()),
            ("NewInternalPort", internal_port.to_string()),
            ("NewInternalClient", self.local_ip.to_string()),
            ("NewEnabled", "1".to_owned()),
            ("NewPortMappingDescription", description.to_owned()),
            ("NewLeaseDuration", lease_duration.as_secs().to_string()),
        ];
        call_action(
            &self.client,
            &self.control_url,
            &self.service_type,
            "AddPortMapping",
            &args,
            self.log_exchanges,
        )
        .instrument(self.span())
        .await?;
        debug!(local_ip = %self.local_ip, external_port, internal_port, %protocol, "successfully port forwarded");
        Ok(())
    }

    pub async fn delete_port_mapping(
        &self,
        protocol: Protocol,
        external_port: u16,
    ) -> anyhow::Result<()> {
        let args = [
            ("NewRemoteHost", String::new()),
            ("NewExternalPort", external_port.to_string()),
            ("NewProtocol", protocol.to_string()),
        ];
        call_action(
            &self.client,
            &self.control_url,
            &self.service_type,
            "DeletePortMapping",
            &args,
            self.log_exchanges,
        )
        .instrument(self.span())
        .await?;
        debug!(external_port, %protocol, "removed port mapping");
        Ok(())
    }
}
