//! COBUILD Hub Entry Point
//!
//! Binds the listener, starts serving, and only then asks the configured
//! exposer for a public URL.

use std::process::ExitCode;
use std::sync::Arc;

use cobuild_hub::expose::subdomain_hint;
use cobuild_hub::telemetry::{init_tracer, TelemetryConfig};
use cobuild_hub::{create_hub_router, exposer_for, ApiError, ApiResult, HubConfig, HubState};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cobuild-hub: {}", e);
            tracing::error!(error = %e, "Hub stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ApiResult<()> {
    let config = HubConfig::from_env().map_err(|e| ApiError::invalid_input(e.to_string()))?;
    init_tracer(&TelemetryConfig {
        json: config.log_json,
        ..TelemetryConfig::default()
    })?;

    let addr = config.bind_addr().map_err(|e| ApiError::invalid_input(e.to_string()))?;
    let state = Arc::new(HubState::from_config(&config));
    let app = create_hub_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;
    let local_port = listener
        .local_addr()
        .map(|a| a.port())
        .unwrap_or(config.port);
    tracing::info!(
        %addr,
        chat_capacity = config.chat_capacity,
        data_dir = %config.data_dir.display(),
        "Starting COBUILD hub"
    );

    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    // Keeps the tunnel process alive for as long as the hub runs.
    let _exposure = match exposer_for(&config) {
        None => None,
        Some(exposer) => {
            let hint = subdomain_hint(&config.expose_subdomain_prefix);
            match exposer.expose(local_port, &hint).await {
                Ok(exposure) => {
                    tracing::info!(url = %exposure.url, "Hub reachable at public URL");
                    Some(exposure)
                }
                Err(e) if config.expose_required => {
                    server.abort();
                    return Err(ApiError::service_unavailable(format!(
                        "Public exposure failed: {}",
                        e
                    )));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Public exposure failed, hub is reachable locally only");
                    None
                }
            }
        }
    };

    tokio::select! {
        joined = server => {
            match joined {
                Ok(result) => result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?,
                Err(e) => return Err(ApiError::internal_error(format!("Server task failed: {}", e))),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
