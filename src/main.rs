use carrymate::client::Client;
use carrymate::configuration::get_configuration;
use carrymate::navigation::LogNavigator;
use carrymate::storage::FileStore;
use carrymate::telemetry::{init_telemetry, LogFormat};
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry(LogFormat::from_env());

    tracing::info!("Starting carrymate client");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!(base_url = %config.api.base_url, "Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let store = FileStore::open(&configuration.storage.path).map_err(|e| {
        tracing::error!(path = %configuration.storage.path, "Failed to open session store: {}", e);
        e
    })?;

    let client = Client::build(&configuration, Arc::new(store), Arc::new(LogNavigator))
        .map_err(|e| {
            tracing::error!("Failed to build client: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "Client setup error")
        })?;

    client.start().await;

    let state = client.session().state();
    match state.user {
        Some(user) if state.is_authenticated => {
            tracing::info!(user_id = user.id, username = %user.username, "Session active")
        }
        _ if state.is_authenticated => tracing::info!("Session active"),
        _ => tracing::info!("No active session, login required"),
    }

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    client.shutdown();

    Ok(())
}
