//! Web form service entry-point: loads form definitions, wires storage and
//! notification sinks, and serves the form endpoints.

mod server;

use std::sync::Arc;

use actix_web::dev::ServerHandle;
use actix_web::web;
use color_eyre::eyre::{Context, Result};
use ortho_config::OrthoConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use server::{ServerConfig, create_server};
use web_form::domain::access::AccessController;
use web_form::domain::notification::{BrokerDispatcher, WebhookDispatcher};
use web_form::domain::ports::{CaptchaVerifier, SubmissionStore, TemplateRenderer};
use web_form::domain::submission::{FormRegistry, NotificationFactory, SubmissionService};
use web_form::inbound::http::health::HealthState;
use web_form::inbound::http::session_config::{BuildMode, session_key};
use web_form::inbound::http::state::{HttpOptions, HttpState};
use web_form::outbound::amqp::LapinConnector;
use web_form::outbound::captcha::TurnstileVerifier;
use web_form::outbound::forms::FormLoader;
use web_form::outbound::persistence::{FileSubmissionStore, MemorySubmissionStore};
use web_form::outbound::template::MiniJinjaRenderer;
use web_form::outbound::webhook::ReqwestWebhookTransport;
use web_form::settings::{AppSettings, StorageKind};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = AppSettings::load().wrap_err("failed to load settings")?;
    let mode = BuildMode::from_debug_assertions();
    let key = session_key(
        settings.session_key_file.as_deref(),
        settings.session_allow_ephemeral(),
        mode,
    )?;

    let store = build_store(&settings)?;
    let renderer: Arc<dyn TemplateRenderer> = Arc::new(MiniJinjaRenderer::new());
    let forms = FormLoader::new(renderer.as_ref())
        .load(settings.configs_path())
        .wrap_err("failed to load form definitions")?;

    let transport = Arc::new(ReqwestWebhookTransport::new().wrap_err("failed to build HTTP client")?);
    let webhooks = Arc::new(WebhookDispatcher::new(
        settings.webhook_capacity(),
        transport,
        Arc::clone(&renderer),
    ));
    let broker = settings.amqp_url().map(|url| {
        Arc::new(BrokerDispatcher::new(
            settings.amqp_capacity(),
            Arc::new(LapinConnector::new(url)),
            Arc::clone(&renderer),
        ))
    });

    let factory = NotificationFactory::new(Arc::clone(&webhooks), broker.clone());
    let mut registry = FormRegistry::new();
    for form in forms {
        registry.insert(factory.bind(form)?)?;
    }
    info!(forms = registry.len(), configs = %settings.configs_path().display(), "form definitions loaded");

    let mut captcha: Vec<Arc<dyn CaptchaVerifier>> = Vec::new();
    if let Some(secret) = settings.turnstile_secret() {
        let verifier = TurnstileVerifier::new(secret, settings.captcha_timeout())
            .wrap_err("failed to build captcha client")?;
        captcha.push(Arc::new(verifier));
    }

    let service = SubmissionService::new(AccessController::new(captcha), store, Arc::clone(&renderer));
    let options = HttpOptions {
        disable_xsrf: settings.disable_xsrf(),
        disable_listing: settings.disable_listing(),
        trusted_identity_headers: settings.trusted_identity_headers(),
        cookie_secure: settings.cookie_secure(),
        turnstile_site_key: settings.turnstile_site_key.clone(),
    };
    let http_state = web::Data::new(HttpState::new(Arc::new(registry), service, options));

    let shutdown = CancellationToken::new();
    let mut workers = Vec::new();
    {
        let webhooks = Arc::clone(&webhooks);
        let token = shutdown.clone();
        workers.push(actix_web::rt::spawn(async move { webhooks.run(token).await }));
    }
    if let Some(broker) = broker {
        let token = shutdown.clone();
        workers.push(actix_web::rt::spawn(async move { broker.run(token).await }));
    }

    let health_state = web::Data::new(HealthState::new());
    let config = ServerConfig::from_settings(&settings, key, mode);
    let bind_addr = config.bind_addr();
    let server = create_server(health_state.clone(), http_state, config)?;
    actix_web::rt::spawn(stop_on_signal(health_state, server.handle()));
    info!(%bind_addr, "listening");

    server.await?;

    shutdown.cancel();
    for worker in workers {
        if let Err(error) = worker.await {
            warn!(%error, "notification dispatcher panicked");
        }
    }
    info!("shutdown complete");
    Ok(())
}

fn build_store(settings: &AppSettings) -> Result<Arc<dyn SubmissionStore>> {
    let store: Arc<dyn SubmissionStore> = match settings.storage_kind()? {
        StorageKind::Files => {
            let root = settings.storage_root();
            let store = FileSubmissionStore::open(root)
                .wrap_err_with(|| format!("failed to open storage at {}", root.display()))?;
            Arc::new(store)
        }
        StorageKind::Memory => {
            warn!("using in-memory storage; submissions are lost on restart");
            Arc::new(MemorySubmissionStore::new())
        }
    };
    Ok(store)
}

async fn stop_on_signal(health_state: web::Data<HealthState>, handle: ServerHandle) {
    wait_for_signal().await;
    info!("shutdown requested");
    health_state.mark_unhealthy();
    handle.stop(true).await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(error) => {
            warn!(%error, "SIGTERM handler unavailable");
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "ctrl-c handler unavailable");
            }
            return;
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                warn!(%error, "ctrl-c handler failed");
            }
        }
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "ctrl-c handler unavailable");
    }
}
