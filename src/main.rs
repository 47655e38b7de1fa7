use admission::{config::AdmissionConfig, init_gateway, init_tracing};
use std::env;
use std::process;

#[tokio::main]
async fn main() {
    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/admission.yaml".to_string());

    // Load configuration
    let config = match AdmissionConfig::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            eprintln!("Usage: admission [config_file]");
            process::exit(1);
        }
    };

    // Initialize tracing
    init_tracing(config.server.log_format);

    // Start the gateway
    if let Err(e) = init_gateway(config).await {
        eprintln!("Admission gateway error: {}", e);
        process::exit(1);
    }
}
