mod config;
mod core;
mod error;
mod interfaces;
mod logging;

use tracing::error;

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = interfaces::web::run_server().await {
        error!("Server exited: {}", e);
        std::process::exit(1);
    }
}
