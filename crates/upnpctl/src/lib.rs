//! Command line control of UPnP Internet Gateway Devices: list the gateways on the local
//! network and add or remove NAT port mappings on one of them.

pub mod cli;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod mapping;

pub use error::{Error, Result};
