use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nomadlet::config::{hostname, AgentConfig};
use nomadlet::node::Node;
use nomadlet::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "nomadlet")]
#[command(version)]
#[command(about = "Client agent that registers a node and runs the allocations placed on it")]
struct Args {
    /// Region the node belongs to
    #[arg(long, default_value = "global")]
    region: String,

    /// Datacenter the node belongs to
    #[arg(long = "dc", default_value = "dc1")]
    datacenter: String,

    /// Control-plane RPC address (host:port)
    #[arg(long, default_value = "127.0.0.1:4647")]
    server: String,

    /// Node name (defaults to the host name)
    #[arg(long)]
    name: Option<String>,

    /// Path of the node identity file
    #[arg(long, default_value = "state.json")]
    state: PathBuf,

    /// Number of CPU cores to advertise
    #[arg(long, default_value = "2")]
    cores: u32,

    /// CPU speed per core to advertise, in MHz
    #[arg(long, default_value = "1000")]
    mhz: u32,

    /// Memory to advertise, in MB
    #[arg(long, default_value = "1000")]
    mem: u32,

    /// Directory for task stdout/stderr logs
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,
}

impl Args {
    fn into_config(self) -> AgentConfig {
        let name = self.name.or_else(hostname).unwrap_or_default();
        AgentConfig {
            region: self.region,
            datacenter: self.datacenter,
            name,
            server: self.server,
            state_path: self.state,
            log_dir: self.log_dir,
            cores: self.cores,
            mhz: self.mhz,
            mem_mb: self.mem,
            ..AgentConfig::default()
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.into_config();
    if config.name.trim().is_empty() {
        eprintln!("must specify node name");
        std::process::exit(1);
    }

    tracing::info!(
        name = %config.name,
        region = %config.region,
        datacenter = %config.datacenter,
        server = %config.server,
        state = %config.state_path.display(),
        "Starting nomadlet"
    );

    let node = match Node::new(config).await {
        Ok(node) => node,
        Err(e) => {
            eprintln!("error creating client: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = install_shutdown_handler();
    if let Err(e) = node.run(shutdown).await {
        eprintln!("agent failed: {}", e);
        std::process::exit(1);
    }
}
