use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Result;
use valut_chart::{api, build_cache, config::AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cache = web::Data::new(build_cache(&config).await?);

    match cache.ensure_fresh().await {
        Ok(Some(outcome)) => log::info!("Initial refresh: {:?}", outcome),
        Ok(None) => log::info!("Exchange rates are fresh"),
        Err(e) => log::error!("Initial refresh failed: {}", e),
    }

    log::info!("Listening on {}", config.listen_addr);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(cache.clone())
            .configure(api::configure)
    })
    .bind(config.listen_addr)?
    .run()
    .await?;

    Ok(())
}
