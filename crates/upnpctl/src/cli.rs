use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, error::ErrorKind};
use upnpctl_igd::Protocol;

use crate::{
    error::Error,
    mapping::{PortMapping, parse_external_port},
};

pub const DEFAULT_DESCRIPTION: &str = concat!("upnpctl v", env!("CARGO_PKG_VERSION"));

#[derive(Parser, Debug)]
#[command(version, author, about, arg_required_else_help = true)]
pub struct Opts {
    /// Verbose logs, including the SOAP exchange with the device. Repeat (-vv) for trace logs.
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// How long to wait for devices to answer the discovery broadcast, e.g. 3s, 500ms.
    #[arg(long, value_parser = parse_duration::parse, default_value = "3s", global = true)]
    pub discover_timeout: Duration,

    #[command(subcommand)]
    pub subcommand: SubCommand,
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Discovers all available UPnP devices
    List,
    /// Adds a set of port mappings to a device
    Add(AddOpts),
    /// Removes a set of port mappings from a device
    Rem(RemOpts),
}

#[derive(Args, Debug)]
pub struct AddOpts {
    /// The device id. Required when more than one device is found.
    #[arg(long)]
    pub id: Option<String>,

    /// Port type: tcp or udp
    #[arg(long = "type", value_parser = parse_protocol, default_value = "tcp")]
    pub protocol: Protocol,

    /// Port mapping timeout, e.g. 1h or 30m. Mappings are permanent when not set.
    #[arg(long, value_parser = parse_lease_duration)]
    pub timeout: Option<Duration>,

    /// Port mapping description. Some routers display it along-side port mappings.
    #[arg(long, default_value = DEFAULT_DESCRIPTION)]
    pub desc: String,

    /// An external port and optional internal port: "external[:internal]", e.g. "3000" or
    /// "5000:6000".
    #[arg(value_name = "MAPPING", required = true, value_parser = parse_mapping)]
    pub mappings: Vec<PortMapping>,
}

#[derive(Args, Debug)]
pub struct RemOpts {
    /// The device id. Required when more than one device is found.
    #[arg(long)]
    pub id: Option<String>,

    /// Port type: tcp or udp
    #[arg(long = "type", value_parser = parse_protocol, default_value = "tcp")]
    pub protocol: Protocol,

    /// The external port identifying a port mapping to remove.
    #[arg(value_name = "EXTERNAL", required = true, value_parser = parse_external_port)]
    pub ports: Vec<u16>,
}

pub fn parse_protocol(s: &str) -> Result<Protocol, Error> {
    Ok(s.parse()?)
}

fn parse_mapping(s: &str) -> Result<PortMapping, Error> {
    s.parse()
}

/// Lease durations are whole seconds in a ui4 on the wire and zero means "permanent", so
/// anything that would round down to zero or overflow 32 bits is refused.
fn parse_lease_duration(s: &str) -> Result<Duration, Error> {
    let d = parse_duration::parse(s)
        .map_err(|e| Error::Usage(format!("invalid timeout '{s}': {e}")))?;
    if d.as_secs() == 0 {
        return Err(Error::Usage(format!(
            "invalid timeout '{s}': must be at least 1s"
        )));
    }
    if d.as_secs() > u64::from(u32::MAX) {
        return Err(Error::Usage(format!(
            "invalid timeout '{s}': must be at most {}s",
            u32::MAX
        )));
    }
    Ok(d)
}

/// Process exit code for a command line that did not parse into [`Opts`].
///
/// Asking for help is treated like a usage error and exits non-zero; `--version` exits 0.
pub fn exit_code_for(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp => 1,
        _ => u8::try_from(err.exit_code()).unwrap_or(2),
    }
}
