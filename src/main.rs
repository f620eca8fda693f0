use mpesa_express::config::Config;
use mpesa_express::server::Server;
use mpesa_express::telemetry;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    telemetry::init_tracing();

    // Missing gateway credentials fail here, before anything binds
    let config = Config::load()?;
    tracing::info!("Loaded configuration: {:?}", config);

    let server = Server::new(&config).await?;
    server.run().await
}
