use std::env;
use std::path::Path;

use pds_calc::core::EngineConfig;

const USAGE: &str = "Usage: pds-calc serve [port] [--config FILE] | pds-calc calc [OPTIONS]";

#[tokio::main]
async fn main() {
    pds_calc::logging::init_logging();

    let raw_args: Vec<String> = env::args().collect();
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let rest = &raw_args[2..];
            let port = rest
                .first()
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            let config = match config_flag(rest) {
                Some(path) => EngineConfig::load(Path::new(path)),
                None => Ok(EngineConfig::default()),
            };
            let config = match config {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Config error: {e}");
                    std::process::exit(1);
                }
            };
            if let Err(e) = pds_calc::api::run_http_server(port, config).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Some("calc") => {
            let args = std::iter::once("pds-calc calc".to_string()).chain(raw_args[2..].to_vec());
            match pds_calc::api::run_cli(args) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

fn config_flag(args: &[String]) -> Option<&String> {
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|idx| args.get(idx + 1))
}
