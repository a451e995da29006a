use std::path::Path;

use arena::configuration::config::Config;
use arena::controller::controller_handler::Controller;
use clap::Parser;
use log::{error, info};

#[derive(Parser)]
#[command(name = "arena")]
#[command(version = "0.1.0")]
#[command(about = "Interactive sandbox and duel backend for CTF competitions")]
struct Args {
    /// Path to the TOML configuration file; defaults apply when omitted
    config_file: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
 █████╗ ██████╗ ███████╗███╗   ██╗ █████╗
██╔══██╗██╔══██╗██╔════╝████╗  ██║██╔══██╗
███████║██████╔╝█████╗  ██╔██╗ ██║███████║
██╔══██║██╔══██╗██╔══╝  ██║╚██╗██║██╔══██║
██║  ██║██║  ██║███████╗██║ ╚████║██║  ██║
╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝╚═╝  ╚═══╝╚═╝  ╚═╝
==========================================
 Interactive sandbox & duel backend v0.1.0
==========================================
"
    );

    let args = Args::parse();

    let config = match &args.config_file {
        Some(path) => match Config::from_file(Path::new(path)) {
            Ok(config) => {
                info!("Configuration imported from {}", path);
                config
            }
            Err(e) => {
                error!("Unable to import configuration from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    let mut controller = Controller::new(config);
    if let Err(e) = controller.run().await {
        error!("Controller exited with error: {}", e);
        std::process::exit(1);
    }
}
