//! Vault CLI
//!
//! Single-binary client that:
//! 1. Loads the environment and device settings from TOML
//! 2. Opens the on-disk token store
//! 3. Runs one command through the authenticated API client
//! 4. Clears the stored session if the server forces a logout

mod cli;
mod config;
mod metrics;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::ReqwestTransport;
use vault_api::{ApiClient, IdentityOutcome, LogoutEvent};
use vault_auth::{DeviceInfo, FileTokenStore, TokenRequest, TokenStore, TwoFactorProviderType};

use crate::cli::{Cli, Command, LoginArgs};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr so command output on stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    let args = Cli::parse();

    let config_path = Config::resolve_path(args.config);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        device = config.client.device.label(),
        timeout_secs = config.client.timeout_secs,
        token_file = %config.client.token_file.display(),
        "configuration loaded"
    );

    let store = Arc::new(
        FileTokenStore::load(config.client.token_file.clone())
            .await
            .with_context(|| {
                format!(
                    "failed to open token file {}",
                    config.client.token_file.display()
                )
            })?,
    );
    let transport = ReqwestTransport::new(Duration::from_secs(config.client.timeout_secs))
        .context("failed to build HTTP client")?;

    let (logout_tx, logout_rx) = vault_api::logout::channel();
    let logout_task = spawn_logout_listener(logout_rx, store.clone());

    let client = ApiClient::new(
        &config.environment,
        config.client.device,
        store.clone(),
        Arc::new(transport),
        Arc::new(logout_tx),
    );

    let command = args.command.name();
    let started = Instant::now();
    let device = config.client.device_info();
    let outcome = run(&client, &store, device, args.command).await;
    metrics::record_command(command, outcome.is_ok(), started.elapsed().as_secs_f64());

    // Dropping the client closes the logout channel so the listener can finish
    drop(client);
    if let Err(e) = logout_task.await {
        error!(error = %e, "logout listener panicked");
    }

    if args.metrics {
        eprintln!("{}", prometheus_handle.render());
    }

    match outcome {
        Ok(Some(value)) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            let status = e.downcast_ref::<vault_api::Error>().and_then(vault_api::Error::status);
            error!(command, status, error = %e, "command failed");
            Err(e)
        }
    }
}

/// Clear the stored session on every forced logout.
fn spawn_logout_listener(
    mut events: UnboundedReceiver<LogoutEvent>,
    store: Arc<FileTokenStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            warn!(expired = event.expired, "session ended by server, clearing tokens");
            if let Err(e) = store.clear().await {
                error!(error = %e, "failed to clear token file");
            }
        }
    })
}

async fn run(
    client: &ApiClient,
    store: &FileTokenStore,
    device: Option<DeviceInfo>,
    command: Command,
) -> Result<Option<Value>> {
    match command {
        Command::Profile => Ok(Some(client.get_profile().await?)),
        Command::RevisionDate => Ok(Some(client.get_account_revision_date().await?.into())),
        Command::Sync => Ok(Some(client.get_sync().await?)),
        Command::Refresh => {
            let tokens = client.refresh_tokens().await?;
            info!(expires_in = tokens.expires_in, "tokens refreshed");
            Ok(None)
        }
        Command::Login(args) => login(client, store, device, args).await,
    }
}

async fn login(
    client: &ApiClient,
    store: &FileTokenStore,
    device: Option<DeviceInfo>,
    args: LoginArgs,
) -> Result<Option<Value>> {
    let second_factor = args.second_factor();
    let LoginArgs {
        email,
        password_hash,
        remember,
        ..
    } = args;

    let mut request = TokenRequest::new(email.clone(), password_hash);
    if let Some(device) = device {
        request = request.with_device(device);
    }
    match second_factor {
        Some((provider, code)) => request = request.with_two_factor(provider, code, remember),
        None => {
            if let Some(token) = store.two_factor_token(&email).await {
                info!("using remembered second factor");
                request = request.with_two_factor(TwoFactorProviderType::Remember, token, false);
            }
        }
    }
    match client.post_identity_token(&request).await? {
        IdentityOutcome::Token(tokens) => {
            store
                .set_tokens(tokens.access_token, tokens.refresh_token)
                .await
                .context("failed to persist tokens")?;
            if let Some(remember_token) = tokens.two_factor_token {
                store
                    .set_two_factor_token(&email, remember_token)
                    .await
                    .context("failed to persist remember token")?;
            }
            info!("logged in");
            Ok(None)
        }
        IdentityOutcome::TwoFactor(challenge) => {
            let offered: Vec<_> = challenge.providers().iter().map(|p| p.label()).collect();
            bail!(
                "second factor required, retry with --code <code> --provider <one of: {}>",
                offered.join(", ")
            )
        }
    }
}
