use clap::Parser;
use log::{error, info};
use mits::configuration::config::Config;
use mits::controller::controller_handler::Controller;
use std::path::Path;

#[derive(Parser)]
#[command(name = "mits")]
#[command(version = "0.1.0")]
#[command(about = "Multiplayer Intrusion Training Server")]
struct Args {
    config_file: String,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
███╗   ███╗██╗████████╗███████╗
████╗ ████║██║╚══██╔══╝██╔════╝
██╔████╔██║██║   ██║   ███████╗
██║╚██╔╝██║██║   ██║   ╚════██║
██║ ╚═╝ ██║██║   ██║   ███████║
╚═╝     ╚═╝╚═╝   ╚═╝   ╚══════╝
================================================
 Multiplayer Intrusion Training Server v0.1.0
================================================
"
    );

    info!("Importing configuration");

    let args = Args::parse();

    if args.config_file.is_empty() {
        error!("No configuration file found");
        std::process::exit(1);
    }

    let config = match Config::from_file(Path::new(args.config_file.as_str())) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration from file: {:?}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration imported successfully");

    let controller = Controller::new(config);
    if let Err(e) = controller.run().await {
        error!("Error occured in the controller process: {:?}, exiting...", e);
        std::process::exit(1);
    }
}
