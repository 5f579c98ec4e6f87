use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use nmz_common::{
    config::SignerConfig, load_config, validate_webhook_url, NamazuConfig, CONFIG_ENV,
};
use nmz_delivery::{RetryPolicy, RetryingSender, Sender};
use nmz_dispatcher::{Dispatcher, StaticRepository, SubscriptionRepository};
use nmz_ingest::{Deduplicator, IngestClient};
use nmz_signer::{
    generate_secret, mask_secret, secret_prefix, sign, sign_v0, SignatureVerifier,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod logging;
mod server;

#[derive(Parser)]
#[command(name = "namazu")]
#[command(about = "Earthquake feed to signed webhook delivery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the upstream feed and deliver matching events until stopped
    Run {
        /// Path to the TOML configuration file
        #[arg(long, env = CONFIG_ENV)]
        config: PathBuf,
    },

    /// Issue a new webhook secret
    Secret,

    /// Check whether a URL is acceptable as a webhook target
    CheckUrl {
        url: String,

        /// Accept plain HTTP and localhost targets
        #[arg(long)]
        allow_localhost: bool,
    },

    /// Print the signature headers for a payload
    Sign {
        #[arg(long)]
        secret: String,

        /// Use the timestamped v0 scheme
        #[arg(long)]
        v0: bool,

        /// Unix seconds for v0 (default: now)
        #[arg(long, requires = "v0")]
        timestamp: Option<i64>,

        payload: String,
    },

    /// Check the signature headers of a received webhook
    Verify {
        /// Configuration whose [signer] window applies; defaults otherwise
        #[arg(long, env = CONFIG_ENV)]
        config: Option<PathBuf>,

        #[arg(long)]
        secret: String,

        /// Value of the X-Signature-256 header
        #[arg(long)]
        signature: String,

        /// Value of the X-Signature-Timestamp header
        #[arg(long)]
        timestamp: Option<String>,

        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = load_config(&config)
                .wrap_err_with(|| format!("failed to load config from {}", config.display()))?;
            config.validate()?;

            let _guard = logging::init_logging(&config.logs)?;
            run(config).await
        }
        Commands::Secret => {
            logging::init_cli_logging();
            let secret = generate_secret()?;
            println!("secret: {secret}");
            println!("masked: {}", mask_secret(&secret));
            println!("prefix: {}", secret_prefix(&secret));
            Ok(())
        }
        Commands::CheckUrl { url, allow_localhost } => {
            logging::init_cli_logging();
            let parsed = validate_webhook_url(&url, allow_localhost)?;
            println!("ok: {parsed}");
            Ok(())
        }
        Commands::Sign { secret, v0, timestamp, payload } => {
            logging::init_cli_logging();
            if v0 {
                let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
                println!("X-Signature-256: {}", sign_v0(&secret, timestamp, payload.as_bytes()));
                println!("X-Signature-Timestamp: {timestamp}");
            } else {
                println!("X-Signature-256: {}", sign(&secret, payload.as_bytes()));
            }
            Ok(())
        }
        Commands::Verify { config, secret, signature, timestamp, payload } => {
            logging::init_cli_logging();
            let verifier = verifier_from(config.as_deref())?;
            verifier.verify_headers(
                &secret,
                &signature,
                timestamp.as_deref(),
                payload.as_bytes(),
            )?;
            println!("ok: signature valid");
            Ok(())
        }
    }
}

/// Receiver-side verifier using the `[signer]` window of `config`, if any.
fn verifier_from(config: Option<&Path>) -> Result<SignatureVerifier> {
    let signer = match config {
        Some(path) => {
            let config = load_config(path)
                .wrap_err_with(|| format!("failed to load config from {}", path.display()))?;
            config.validate()?;
            config.signer
        }
        None => SignerConfig::default(),
    };

    Ok(SignatureVerifier::from(&signer))
}

async fn run(config: NamazuConfig) -> Result<()> {
    info!(
        source_endpoint = %config.source_endpoint,
        subscriptions = config.subscriptions.len(),
        retry_enabled = config.retry.enabled,
        max_retries = config.retry.max_retries,
        "starting namazu"
    );

    let cancel = CancellationToken::new();

    let repository: Arc<dyn SubscriptionRepository> =
        Arc::new(StaticRepository::new(config.subscriptions.clone()));
    let sender = Sender::with_timeout(config.sender.timeout())?;
    let sender = RetryingSender::new(sender, RetryPolicy::from(&config.retry));

    let (ingest, events) = IngestClient::new(
        config.source_endpoint.clone(),
        &config.ingest,
        Deduplicator::new(config.dedup.max_seen_ids),
    );

    let metrics_task = config.metrics.clone().map(|metrics| {
        let ingest = ingest.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = server::serve(metrics, ingest, cancel).await {
                error!(error = ?err, "metrics server stopped");
            }
        })
    });

    tokio::select! {
        result = ingest.connect(&cancel) => {
            result.wrap_err("failed to connect to upstream")?;
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal before connecting");
            cancel.cancel();
            return Ok(());
        }
    }

    let dispatcher = Dispatcher::new(repository, sender);
    let dispatch_cancel = cancel.clone();
    let dispatch_task = tokio::spawn(async move { dispatcher.run(events, dispatch_cancel).await });

    shutdown_signal().await;
    info!("received shutdown signal, stopping gracefully");

    cancel.cancel();
    ingest.close();

    if let Err(err) = dispatch_task.await {
        warn!(error = %err, "dispatcher task failed");
    }
    if let Some(task) = metrics_task {
        let _ = task.await;
    }

    info!("namazu shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
