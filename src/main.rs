use std::path::Path;
use std::process::ExitCode;

use mazurka::{init_logging, set_root_directory, Config, WebServer};

const CONFIG_FILE: &str = "config.yaml";

fn main() -> ExitCode {
    init_logging();

    let config = Config::load_or_default(Path::new(CONFIG_FILE));
    let current_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            tracing::error!("failed to resolve the working directory: {err}");
            return ExitCode::FAILURE;
        }
    };
    set_root_directory(current_dir.join(&config.server.asset_folder));

    let server = WebServer::builder()
        .port(config.server.port)
        .alive_time(config.server.alive_duration())
        .build();
    let mut server = match server {
        Ok(server) => server,
        Err(err) => {
            tracing::error!("failed to create server: {err}");
            return ExitCode::FAILURE;
        }
    };

    let handle = server.handle();
    ctrlc::set_handler(move || {
        tracing::info!("received SIGINT, shutting down");
        handle.close();
    })
    .expect("failed to set the SIGINT handler");

    match server.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("failed to run server: {err}");
            ExitCode::FAILURE
        }
    }
}
