use upnpctl_igd::{IgdOptions, discover};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let opts = IgdOptions {
        log_exchanges: true,
        ..Default::default()
    };
    for gw in discover(&opts).await? {
        println!(
            "{} ({}) at {}: {} via {}",
            gw.friendly_name, gw.unique_id, gw.location, gw.control_url, gw.local_ip
        );
    }
    Ok(())
}
