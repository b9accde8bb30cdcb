use std::{io::Write, time::Duration};

use tracing::{info, warn};

use crate::{
    cli::{AddOpts, RemOpts, SubCommand},
    device::{Device, Discover, IgdHandle, discover_devices, resolve_device},
    error::{Error, Result},
};

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

async fn discover<D: Discover>(
    discovery: &D,
    out: &mut impl Write,
) -> Result<Vec<Device<D::Handle>>> {
    writeln!(out, "Discovering UPnP devices...")?;
    discover_devices(discovery).await
}

async fn list<D: Discover>(discovery: &D, out: &mut impl Write) -> Result<()> {
    for d in discover(discovery, out).await? {
        let s = &d.summary;
        writeln!(out, "  #{}: {} ({})", s.id, s.name, s.address)?;
    }
    Ok(())
}

async fn add<D: Discover>(opts: &AddOpts, discovery: &D, out: &mut impl Write) -> Result<()> {
    let devices = discover(discovery, out).await?;
    let device = resolve_device(&devices, opts.id.as_deref())?;
    let lease_duration = opts.timeout.unwrap_or(Duration::ZERO);

    let n = opts.mappings.len();
    writeln!(out, "Adding #{n} mapping{}...", plural(n))?;
    let mut failed = 0;
    for &mapping in opts.mappings.iter() {
        match device
            .handle
            .add_port_mapping(opts.protocol, mapping, &opts.desc, lease_duration)
            .await
        {
            Ok(()) => {
                info!(device = device.id(), %mapping, protocol = %opts.protocol, "added mapping");
                writeln!(out, "  {mapping}/{}", opts.protocol)?;
            }
            Err(err) => {
                failed += 1;
                writeln!(out, "{}", Error::AddMappingFailed { mapping, err })?;
            }
        }
    }
    if failed > 0 {
        warn!("{failed} of {n} mapping{} could not be added", plural(n));
    }
    writeln!(out, "Done")?;
    Ok(())
}

async fn rem<D: Discover>(opts: &RemOpts, discovery: &D, out: &mut impl Write) -> Result<()> {
    let devices = discover(discovery, out).await?;
    let device = resolve_device(&devices, opts.id.as_deref())?;

    let n = opts.ports.len();
    writeln!(out, "Removing #{n} mapping{}...", plural(n))?;
    let mut failed = 0;
    for &external in opts.ports.iter() {
        match device
            .handle
            .delete_port_mapping(opts.protocol, external)
            .await
        {
            Ok(()) => {
                info!(device = device.id(), external, protocol = %opts.protocol, "removed mapping");
                writeln!(out, "  {external}/{}", opts.protocol)?;
            }
            Err(err) => {
                failed += 1;
                writeln!(out, "{}", Error::RemoveMappingFailed { external, err })?;
            }
        }
    }
    if failed > 0 {
        warn!("{failed} of {n} mapping{} could not be removed", plural(n));
    }
    writeln!(out, "Done")?;
    Ok(())
}

/// Runs one command to completion, writing user facing output to `out`.
///
/// Failures of individual mappings are reported and do not stop the remaining ones; only
/// discovery and device selection errors are returned.
pub async fn run<D: Discover>(
    subcommand: &SubCommand,
    discovery: &D,
    out: &mut impl Write,
) -> Result<()> {
    match subcommand {
        SubCommand::List => list(discovery, out).await,
        SubCommand::Add(opts) => add(opts, discovery, out).await,
        SubCommand::Rem(opts) => rem(opts, discovery, out).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use upnpctl_igd::Protocol;

    use super::*;
    use crate::{
        cli::{DEFAULT_DESCRIPTION, Opts},
        device::tests::{Call, MockDiscovery, router_a, router_b},
        mapping::PortMapping,
    };

    async fn run_args(discovery: &MockDiscovery, args: &[&str]) -> (Result<()>, String) {
        let opts = Opts::try_parse_from(std::iter::once("upnpctl").chain(args.iter().copied()))
            .unwrap();
        let mut out = Vec::new();
        let result = run(&opts.subcommand, discovery, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_list_no_devices() {
        let (result, out) = run_args(&MockDiscovery(vec![]), &["list"]).await;
        result.unwrap();
        assert_eq!(out, "Discovering UPnP devices...\n");
    }

    #[tokio::test]
    async fn test_list_prints_every_device() {
        let discovery = MockDiscovery(vec![router_a(), router_b()]);
        let (result, out) = run_args(&discovery, &["list"]).await;
        result.unwrap();
        let devices = discover_devices(&discovery).await.unwrap();
        let expected = format!(
            "Discovering UPnP devices...\n  #{}: ARRIS TG3492LG (192.168.0.1)\n  #{}: FRITZ!Box 7530 (192.168.178.1)\n",
            devices[0].id(),
            devices[1].id()
        );
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_add_and_rem_require_a_device() {
        for args in [&["add", "3000"][..], &["rem", "3000"][..]] {
            let (result, _) = run_args(&MockDiscovery(vec![]), args).await;
            let err = result.unwrap_err();
            assert!(matches!(err, Error::NoDevicesFound));
            assert_eq!(err.to_string(), "No UPnP devices found");
        }
    }

    #[tokio::test]
    async fn test_add_udp_on_single_device() {
        let gw = router_a();
        let calls = gw.calls.clone();
        let (result, out) =
            run_args(&MockDiscovery(vec![gw]), &["add", "--type", "udp", "3000:3001"]).await;
        result.unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![Call::Add {
                protocol: Protocol::Udp,
                mapping: PortMapping {
                    external: 3000,
                    internal: 3001
                },
                description: DEFAULT_DESCRIPTION.to_owned(),
                lease_duration: Duration::ZERO,
            }]
        );
        assert_eq!(
            out,
            "Discovering UPnP devices...\nAdding #1 mapping...\n  3000:3001/UDP\nDone\n"
        );
    }

    #[tokio::test]
    async fn test_rem_on_single_device() {
        let gw = router_a();
        let calls = gw.calls.clone();
        let (result, out) = run_args(&MockDiscovery(vec![gw]), &["rem", "3000"]).await;
        result.unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![Call::Delete {
                protocol: Protocol::Tcp,
                external_port: 3000
            }]
        );
        assert!(out.ends_with("Removing #1 mapping...\n  3000/TCP\nDone\n"));
    }

    #[tokio::test]
    async fn test_ambiguous_device_lists_candidates() {
        let (a, b) = (router_a(), router_b());
        let (a_calls, b_calls) = (a.calls.clone(), b.calls.clone());
        let (result, _) = run_args(&MockDiscovery(vec![a, b]), &["add", "3000"]).await;
        let err = result.unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Error::AmbiguousDevice(ref c) if c.len() == 2));
        assert!(msg.starts_with("The --id option is required"));
        assert!(msg.contains("=> ARRIS TG3492LG (192.168.0.1)"));
        assert!(msg.contains("=> FRITZ!Box 7530 (192.168.178.1)"));
        assert!(a_calls.borrow().is_empty());
        assert!(b_calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_select_device_by_id() {
        let (a, b) = (router_a(), router_b());
        let (a_calls, b_calls) = (a.calls.clone(), b.calls.clone());
        let discovery = MockDiscovery(vec![a, b]);
        let b_id = discover_devices(&discovery).await.unwrap()[1].id().to_owned();

        let (result, _) = run_args(&discovery, &["rem", "--id", b_id.as_str(), "3000", "3001"]).await;
        result.unwrap();
        assert!(a_calls.borrow().is_empty());
        assert_eq!(b_calls.borrow().len(), 2);

        let (result, _) = run_args(&discovery, &["rem", "--id", "nope", "3000"]).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No UPnP devices found matching id: nope"
        );
    }

    #[tokio::test]
    async fn test_failed_mapping_does_not_stop_the_rest() {
        let mut gw = router_a();
        gw.failing_ports = vec![3001];
        let calls = gw.calls.clone();
        let (result, out) = run_args(
            &MockDiscovery(vec![gw]),
            &["add", "--timeout", "1h", "3000", "3001", "3002"],
        )
        .await;
        result.unwrap();
        assert_eq!(calls.borrow().len(), 3);
        assert!(matches!(
            calls.borrow()[2],
            Call::Add { lease_duration, .. } if lease_duration == Duration::from_secs(3600)
        ));
        assert!(out.contains(
            "Failed to add mapping 3001:3001 (UPnP error 718: ConflictInMappingEntry)\n"
        ));
        assert!(out.contains("  3002:3002/TCP\n"));
        assert!(out.ends_with("Done\n"));
    }

    #[tokio::test]
    async fn test_failed_removal_does_not_stop_the_rest() {
        let mut gw = router_a();
        gw.failing_ports = vec![3001];
        let calls = gw.calls.clone();
        let (result, out) = run_args(
            &MockDiscovery(vec![gw]),
            &["rem", "--type", "udp", "3000", "3001", "3002"],
        )
        .await;
        result.unwrap();
        let ports = calls
            .borrow()
            .iter()
            .map(|c| match c {
                Call::Delete {
                    protocol: Protocol::Udp,
                    external_port,
                } => *external_port,
                other => panic!("unexpected call {other:?}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(ports, vec![3000, 3001, 3002]);
        assert!(out.ends_with(
            "Removing #3 mappings...\n  3000/UDP\nFailed to remove mapping 3001 (UPnP error 718: ConflictInMappingEntry)\n  3002/UDP\nDone\n"
        ));
    }
}
