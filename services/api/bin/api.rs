//! Main Entrypoint for the Call Bridge Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the per-call session configuration (prompt, voice, tools).
//! 3. Initializing the tool invoker, realtime connector and supervisor.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use callbridge_api::{
    config::Config,
    router::create_router,
    state::AppState,
    ws::{
        BridgeSupervisor,
        session::BridgeContext,
        upstream::{RealtimeConnector, RealtimeEndpoint},
    },
};
use callbridge_core::{
    session_config::SessionSettings,
    tool::{HttpToolInvoker, ToolInvoker},
};
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down.");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in std::fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

fn session_settings(config: &Config) -> anyhow::Result<SessionSettings> {
    let mut settings = SessionSettings::default().with_voice(config.voice.clone());

    match load_prompts(&config.prompts_path) {
        Ok(prompts) => match prompts.get("system_prompt") {
            Some(prompt) => settings = settings.with_instructions(prompt.trim()),
            None => warn!(
                path = %config.prompts_path.display(),
                "system_prompt.md not found; using built-in instructions."
            ),
        },
        Err(e) => warn!(
            path = %config.prompts_path.display(),
            error = %e,
            "Could not read prompts directory; using built-in instructions."
        ),
    }

    if let Some(tools_path) = &config.tools_path {
        let raw = fs::read_to_string(tools_path)
            .with_context(|| format!("Failed to read tools file {}", tools_path.display()))?;
        let tools = SessionSettings::parse_tools(&raw)
            .with_context(|| format!("Invalid tools file {}", tools_path.display()))?;
        info!(count = tools.len(), "Loaded tool declarations.");
        settings = settings.with_tools(tools);
    }

    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 2. Session Configuration ---
    let settings = Arc::new(session_settings(&config)?);

    // --- 3. Initialize Shared Services ---
    let tools: Arc<dyn ToolInvoker> = Arc::new(
        HttpToolInvoker::new(config.tool_endpoint_url.clone(), config.tool_timeout)
            .context("Failed to build tool endpoint client")?,
    );
    let connector: Arc<dyn RealtimeConnector> = Arc::new(RealtimeEndpoint::from_config(&config));
    let supervisor = Arc::new(BridgeSupervisor::new(BridgeContext {
        settings,
        tools,
        connector,
        fallback_text: config.tool_fallback_text.as_str().into(),
    }));

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        supervisor,
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        provider = ?config.provider,
        voice = %config.voice,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
