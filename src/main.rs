use metrics_gateway::{api, config::Config, logging, metrics};
use tracing::error;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_logger(&config.log_filter) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    metrics::init_metrics();

    if let Err(e) = api::start_gateway(config).await {
        error!("Gateway stopped: {}", e);
        std::process::exit(1);
    }
}
