use tracing::error;
use tracing_subscriber::EnvFilter;

use wscast::{Config, Server};

const DEFAULT_ADDR: &str = "127.0.0.1:9001";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("WSCAST_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let server = Server::new(Config::default());
    if let Err(e) = server.run(&addr).await {
        error!(error = %e, "server exited");
        std::process::exit(1);
    }
}
