use tracking_server::core::{Config, Server};
use tracking_server::{print_banner, setup_environment};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_environment()?;

    print_banner();

    let config = Config::from_env();
    config.validate()?;

    tracing::info!(
        port = config.http_port,
        work_dir = %config.work_dir,
        "starting tracking server"
    );

    let server = Server::new(config);
    server.run().await?;

    tracing::info!("tracking server stopped");
    Ok(())
}
