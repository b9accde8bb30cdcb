use std::time::Duration;

use async_trait::async_trait;
use crypto_hash::{Algorithm, hex_digest};
use tracing::debug;
use upnpctl_igd::{Gateway, IgdOptions, Protocol};
use url::{Host, Url};

use crate::{
    error::{Error, Result},
    mapping::PortMapping,
};

const DEVICE_ID_LEN: usize = 5;

/// The control surface of one discovered gateway.
#[async_trait(?Send)]
pub trait IgdHandle {
    fn unique_id(&self) -> &str;
    fn friendly_name(&self) -> &str;
    fn control_url(&self) -> &Url;

    async fn add_port_mapping(
        &self,
        protocol: Protocol,
        mapping: PortMapping,
        description: &str,
        lease_duration: Duration,
    ) -> anyhow::Result<()>;

    async fn delete_port_mapping(&self, protocol: Protocol, external_port: u16)
    -> anyhow::Result<()>;
}

#[async_trait(?Send)]
pub trait Discover {
    type Handle: IgdHandle;

    async fn discover(&self) -> anyhow::Result<Vec<Self::Handle>>;
}

#[async_trait(?Send)]
impl IgdHandle for Gateway {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    fn control_url(&self) -> &Url {
        &self.control_url
    }

    async fn add_port_mapping(
        &self,
        protocol: Protocol,
        mapping: PortMapping,
        description: &str,
        lease_duration: Duration,
    ) -> anyhow::Result<()> {
        Gateway::add_port_mapping(
            self,
            protocol,
            mapping.external,
            mapping.internal,
            description,
            lease_duration,
        )
        .await
    }

    async fn delete_port_mapping(
        &self,
        protocol: Protocol,
        external_port: u16,
    ) -> anyhow::Result<()> {
        Gateway::delete_port_mapping(self, protocol, external_port).await
    }
}

/// SSDP discovery on the local network.
pub struct UpnpDiscovery {
    opts: IgdOptions,
}

impl UpnpDiscovery {
    pub fn new(opts: IgdOptions) -> Self {
        Self { opts }
    }
}

#[async_trait(?Send)]
impl Discover for UpnpDiscovery {
    type Handle = Gateway;

    async fn discover(&self) -> anyhow::Result<Vec<Gateway>> {
        upnpctl_igd::discover(&self.opts).await
    }
}

/// What gets printed about a device when listing it or asking the user to pick one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub id: String,
    pub name: String,
    pub address: String,
}

pub struct Device<H> {
    pub summary: DeviceSummary,
    pub handle: H,
}

impl<H: IgdHandle> Device<H> {
    pub fn new(handle: H) -> Self {
        let url = handle.control_url();
        let address = match url.host() {
            Some(Host::Ipv6(ip)) => ip.to_string(),
            Some(host) => host.to_string(),
            None => String::new(),
        };
        let host = match url.port_or_known_default() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
            None => url.host_str().unwrap_or_default().to_owned(),
        };
        let summary = DeviceSummary {
            id: derive_device_id(handle.unique_id(), &host),
            name: handle.friendly_name().to_owned(),
            address,
        };
        Device { summary, handle }
    }

    pub fn id(&self) -> &str {
        &self.summary.id
    }
}

/// A short identifier for a device: the leading hex characters of SHA-1(unique_id || host).
pub fn derive_device_id(unique_id: &str, host: &str) -> String {
    let mut data = Vec::with_capacity(unique_id.len() + host.len());
    data.extend_from_slice(unique_id.as_bytes());
    data.extend_from_slice(host.as_bytes());
    let mut id = hex_digest(Algorithm::SHA1, &data);
    id.truncate(DEVICE_ID_LEN);
    id
}

pub async fn discover_devices<D: Discover>(discovery: &D) -> Result<Vec<Device<D::Handle>>> {
    let handles = discovery.discover().await.map_err(Error::Discovery)?;
    let devices = handles.into_iter().map(Device::new).collect::<Vec<_>>();
    for d in devices.iter() {
        debug!(id = d.id(), name = d.summary.name, address = d.summary.address, "device");
    }
    Ok(devices)
}

/// Picks the device to operate on: the one matching `id` when given, otherwise the only one.
pub fn resolve_device<'a, H>(devices: &'a [Device<H>], id: Option<&str>) -> Result<&'a Device<H>> {
    if devices.is_empty() {
        return Err(Error::NoDevicesFound);
    }
    match id {
        Some(id) => devices
            .iter()
            .find(|d| d.summary.id == id)
            .ok_or_else(|| Error::DeviceNotFound(id.to_owned())),
        None => match devices {
            [device] => Ok(device),
            _ => Err(Error::AmbiguousDevice(
                devices.iter().map(|d| d.summary.clone()).collect(),
            )),
        },
    }
}
