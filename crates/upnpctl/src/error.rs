use upnpctl_igd::UnknownProtocol;

use crate::{device::DeviceSummary, mapping::PortMapping};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("Invalid {kind} '{value}'")]
    InvalidPort { kind: &'static str, value: String },

    #[error(transparent)]
    InvalidProtocol(#[from] UnknownProtocol),

    #[error("No UPnP devices found")]
    NoDevicesFound,

    #[error(
        "The --id option is required as there is more than one UPnP device:\n{}",
        candidates_list(.0)
    )]
    AmbiguousDevice(Vec<DeviceSummary>),

    #[error("No UPnP devices found matching id: {0}")]
    DeviceNotFound(String),

    #[error("error discovering UPnP devices: {0:#}")]
    Discovery(anyhow::Error),

    #[error("Failed to add mapping {mapping} ({err:#})")]
    AddMappingFailed {
        mapping: PortMapping,
        err: anyhow::Error,
    },

    #[error("Failed to remove mapping {external} ({err:#})")]
    RemoveMappingFailed { external: u16, err: anyhow::Error },

    #[error("error writing output: {0:#}")]
    Output(#[from] std::io::Error),
}

fn candidates_list(candidates: &[DeviceSummary]) -> String {
    candidates
        .iter()
        .map(|c| format!("  --id {} => {} ({})", c.id, c.name, c.address))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = core::result::Result<T, Error>;
