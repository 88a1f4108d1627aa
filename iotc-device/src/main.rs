use iotc_dps::{Credentials, ProvisionConfig, Provisioner, SystemClock, TlsTransport};
use log::info;

#[derive(clap::Parser)]
#[command(name = "iotc-device")]
#[command(about = "Provision a device against Azure DPS and print its assigned hub")]
struct Cli {
    /// IoT Central scope id (falls back to IOTC_SCOPE_ID)
    #[arg(long)]
    scope_id: Option<String>,

    /// Device id (falls back to IOTC_DEVICE_ID)
    #[arg(long)]
    device_id: Option<String>,

    /// Base64 device symmetric key (falls back to IOTC_DEVICE_KEY)
    #[arg(long)]
    key: Option<String>,

    /// Give up after this many poll attempts instead of retrying forever
    #[arg(long)]
    max_polls: Option<u32>,

    /// DPS endpoint host
    #[arg(long, default_value = iotc_dps::DPS_ENDPOINT)]
    endpoint: String,
}

fn required(flag: Option<String>, env: &str) -> String {
    flag.or_else(|| std::env::var(env).ok()).unwrap_or_else(|| {
        eprintln!("missing required option (or {env})");
        std::process::exit(2);
    })
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli: Cli = clap::Parser::parse();

    let creds = Credentials::new(
        required(cli.scope_id, "IOTC_SCOPE_ID"),
        required(cli.device_id, "IOTC_DEVICE_ID"),
        required(cli.key, "IOTC_DEVICE_KEY"),
    );

    let config = ProvisionConfig {
        max_polls: cli.max_polls,
        ..ProvisionConfig::default()
    };

    info!("provisioning {} via {}", creds.device_id, cli.endpoint);
    let transport = TlsTransport::new(cli.endpoint, 443);
    let mut provisioner = Provisioner::with_config(transport, SystemClock, config);

    match provisioner.provision(&creds).await {
        Ok(hub) => println!("{hub}"),
        Err(e) => {
            eprintln!("provisioning failed: {e}");
            std::process::exit(1);
        }
    }
}
