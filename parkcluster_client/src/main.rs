//! Demo backend-side caller: stands in for the request handler's use of
//! the recommendation cluster — this is the shape of its one call into
//! the cluster.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use parkcluster::broker::amqp::{AmqpBroker, AmqpEndpoint};
use parkcluster::broker::BrokerAdapter;
use parkcluster::{print, RecommendationClient};

#[derive(Parser, Debug)]
#[command(about = "Requests a parking space recommendation from the cluster")]
struct Cli {
    #[arg(long, default_value = "localhost")]
    broker_host: String,

    #[arg(long, default_value = "5672", value_delimiter = ',')]
    broker_ports: Vec<u16>,

    #[arg(long, default_value = "guest")]
    broker_user: String,

    #[arg(long, default_value = "guest")]
    broker_password: String,

    /// Zone to request a space in, e.g. "ZoneA".
    zone: String,

    /// Preferred space tag, e.g. "PS3".
    requested_space: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    print::logger_init();
    let cli = Cli::parse();

    let endpoint = AmqpEndpoint {
        host: cli.broker_host,
        ports: cli.broker_ports,
        user: cli.broker_user,
        password: cli.broker_password,
    };
    let broker: Arc<dyn BrokerAdapter> =
        match AmqpBroker::connect(endpoint, Duration::from_secs(5)).await {
            Ok(b) => Arc::new(b),
            Err(e) => {
                eprintln!("failed to connect to broker: {}", e);
                return ExitCode::FAILURE;
            }
        };

    let client = RecommendationClient::new(broker, Duration::from_secs(15));
    match client.recommend(&cli.zone, &cli.requested_space).await {
        Ok(entries) if entries.is_empty() => {
            println!("no recommendation available");
        }
        Ok(entries) => {
            for entry in entries {
                println!("{}", entry);
            }
        }
        Err(e) => {
            eprintln!("request failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
