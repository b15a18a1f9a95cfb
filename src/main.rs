use foodgram_sdk::{config::Config, serve};

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let config = Config::load();

    log::info!("Starting foodgram on port {}", config.port);

    if let Err(e) = serve(config).await {
        log::error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
