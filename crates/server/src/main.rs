use anyhow::Context;
use converse_core::config::Config;
use invoker::ObservedInvoker;
use llm::{BedrockClient, BedrockSettings};
use observability::{LangfuseConfig, LangfuseExporter, NoopTracer, Tracer};
use secrets::{AwsSecretsManagerStore, LangfuseCredentials};
use server::{create_app, AppState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Converse gateway");

    let config = Config::load_from_env()
        .unwrap_or_else(|e| {
            warn!("Could not load config ({}), using development defaults", e);
            Config::default()
        })
        .with_env_overrides();

    let tracer = build_tracer(&config).await;

    let provider = BedrockClient::new(BedrockSettings {
        region: config.llm.region.clone(),
        ..BedrockSettings::default()
    })
    .await
    .context("Failed to initialize Bedrock client")?;
    info!("Bedrock client ready in {}", provider.region());

    let invoker = Arc::new(
        ObservedInvoker::from_config(Arc::new(provider), tracer, &config)
            .context("Failed to build invoker")?,
    );
    let app = create_app(AppState::new(invoker.clone(), config.llm.primary.clone()));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;
    info!("Server running on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server terminated unexpectedly")?;

    match invoker.flush(SHUTDOWN_FLUSH_TIMEOUT).await {
        Ok(stats) => info!(
            "Flushed {} trace event(s) on shutdown ({} failed, {} dropped)",
            stats.events_flushed, stats.events_failed, stats.dropped_events
        ),
        Err(e) => warn!("Trace flush on shutdown did not complete: {}", e),
    }
    Ok(())
}

/// Langfuse exporter when credentials are available, otherwise a no-op
/// tracer. Tracing problems never stop the server from starting.
async fn build_tracer(config: &Config) -> Arc<dyn Tracer> {
    let settings = &config.langfuse;
    if !settings.enabled {
        info!("Langfuse export disabled by configuration");
        return Arc::new(NoopTracer);
    }

    let store = AwsSecretsManagerStore::new(&settings.region).await;
    let credentials = match LangfuseCredentials::load(&store, &settings.secret_name).await {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!(
                "Langfuse secret '{}' unavailable ({}), trying environment",
                settings.secret_name, e
            );
            match LangfuseCredentials::from_env() {
                Ok(credentials) => credentials,
                Err(e) => {
                    error!("No Langfuse credentials ({}); traces will not be exported", e);
                    return Arc::new(NoopTracer);
                }
            }
        }
    };

    info!("Exporting traces to {}", credentials.host);
    Arc::new(LangfuseExporter::new(LangfuseConfig::from_settings(
        credentials,
        settings,
    )))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
