use std::sync::Arc;

use cloudgate_identity::AzureAdSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cloudgate_observability::init();

    let settings = Arc::new(AzureAdSettings::from_env()?);
    let app = cloudgate_api::app::build_app(settings).await?;

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
