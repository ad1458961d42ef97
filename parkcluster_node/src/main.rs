//! Cluster node executable: loads a [`NodeConfig`], picks a broker
//! transport, and runs a [`ClusterNodeActor`] until told to stop.

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use parkcluster::broker::amqp::{AmqpBroker, AmqpEndpoint};
use parkcluster::broker::memory::MemoryBroker;
use parkcluster::broker::BrokerAdapter;
use parkcluster::dataview::FixtureDataView;
use parkcluster::{print, ClusterNodeActor, NodeConfig};

#[derive(Parser, Debug)]
#[command(about = "Parking recommendation cluster node")]
struct Cli {
    /// Path to a TOML file with the fields of `NodeConfig`.
    #[arg(short, long)]
    config: String,

    /// Broker transport to use. `memory` is for local demos/tests only;
    /// a real deployment always uses `amqp`.
    #[arg(short, long, default_value = "amqp")]
    transport: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    print::logger_init();
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config from {}: {}", cli.config, e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("invalid config: {}", e);
        return ExitCode::FAILURE;
    }

    let broker: Arc<dyn BrokerAdapter> = match cli.transport.as_str() {
        "memory" => Arc::new(MemoryBroker::new()),
        "amqp" => {
            let endpoint = AmqpEndpoint {
                host: config.broker_host.clone(),
                ports: config.broker_ports.clone(),
                user: config.broker_user.clone(),
                password: config.broker_password.clone(),
            };
            match AmqpBroker::connect(endpoint, config.broker_reconnect_delay()).await {
                Ok(b) => Arc::new(b),
                Err(e) => {
                    eprintln!("failed to connect to broker: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        other => {
            eprintln!("unknown transport {:?} (expected 'memory' or 'amqp')", other);
            return ExitCode::FAILURE;
        }
    };

    // The document store is an external collaborator outside this crate;
    // this demo view stands in for it until a real one is wired up.
    let data_view = Arc::new(FixtureDataView::new());

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    }) {
        eprintln!("failed to install Ctrl-C handler: {}", e);
        return ExitCode::FAILURE;
    }

    let actor = ClusterNodeActor::new(config, broker, data_view);
    tokio::select! {
        result = actor.run() => {
            if let Err(e) = result {
                eprintln!("node exited with error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        _ = shutdown_rx.recv() => {
            log::info!("received shutdown signal, stopping");
        }
    }

    ExitCode::SUCCESS
}

fn load_config(path: &str) -> Result<NodeConfig, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}
