//! Narrative Radar: binary entrypoint.
//! Boots the Axum HTTP server with the scoring pipeline, run history and
//! Prometheus metrics wired in.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    narrative_radar::init_tracing();

    let router = narrative_radar::app()
        .await
        .map_err(shuttle_runtime::Error::Custom)?;
    tracing::info!("narrative radar ready");

    Ok(router.into())
}
