use std::{process, sync::Arc, time::Duration};

use axum::http::HeaderValue;
use contact_relay::{
    application::{
        contact::{ContactService, MailEnvelope},
        error::AppError,
    },
    config::{self, ServerMode, Settings},
    infra::{
        error::InfraError,
        http::{self, ContactRateLimiter, CorsPolicy, HttpState, PeerAddr},
        mail::SmtpMailer,
        telemetry,
        tls::{self, TlsListener},
    },
};
use tokio::net::TcpListener;
use tracing::{Dispatch, Level, debug, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Check(args) => run_check(settings, args.skip_smtp_probe).await,
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    // TLS must load before the listener binds.
    let tls_config = match settings.server.tls.as_ref() {
        Some(tls_settings) => Some(Arc::new(tls::load_server_config(tls_settings)?)),
        None => None,
    };

    let mailer = SmtpMailer::new(&settings.mail)?;
    let state = build_http_state(&settings, Arc::new(mailer))?;

    let prune_handle = spawn_rate_limit_pruner(state.rate_limiter.clone());

    let router = http::build_router(state);
    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let result = match tls_config {
        Some(tls_config) => {
            let listener = TlsListener::new(listener, tls_config).map_err(InfraError::from)?;
            info!(
                target = "contact_relay::serve",
                addr = %settings.server.addr,
                "HTTPS server listening"
            );
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<PeerAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal())
            .await
        }
        None => {
            info!(
                target = "contact_relay::serve",
                addr = %settings.server.addr,
                "HTTP server listening"
            );
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<PeerAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal())
            .await
        }
    };

    prune_handle.abort();
    let _ = prune_handle.await;

    result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn run_check(settings: Settings, skip_smtp_probe: bool) -> Result<(), AppError> {
    if let Some(tls_settings) = settings.server.tls.as_ref() {
        tls::load_server_config(tls_settings)?;
        info!(
            target = "contact_relay::check",
            key = %tls_settings.key_path.display(),
            cert = %tls_settings.cert_path.display(),
            chain = %tls_settings.chain_path.display(),
            "TLS material loaded"
        );
    }

    let mailer = SmtpMailer::new(&settings.mail)?;
    if skip_smtp_probe {
        info!(target = "contact_relay::check", "SMTP probe skipped");
    } else {
        tokio::time::timeout(settings.mail.timeout, mailer.probe())
            .await
            .map_err(|_| {
                AppError::unexpected(format!(
                    "{} did not answer within {:?}",
                    mailer.provider().relay_host(),
                    settings.mail.timeout
                ))
            })?
            .map_err(|err| AppError::unexpected(format!("SMTP probe failed: {err}")))?;
        info!(
            target = "contact_relay::check",
            relay = mailer.provider().relay_host(),
            username = %settings.mail.username,
            "SMTP credentials accepted"
        );
    }

    info!(
        target = "contact_relay::check",
        addr = %settings.server.addr,
        https = settings.server.mode == ServerMode::Production,
        allowed_origin = %settings.cors.allowed_origin,
        "configuration is valid"
    );
    Ok(())
}

fn build_http_state(settings: &Settings, mailer: Arc<SmtpMailer>) -> Result<HttpState, AppError> {
    let envelope = MailEnvelope {
        sender: settings.mail.username.clone(),
        recipient: settings.mail.recipient.clone(),
    };
    let contact = ContactService::new(mailer, envelope, settings.mail.timeout);

    let rate_limiter = ContactRateLimiter::new(
        Duration::from_secs(u64::from(settings.rate_limit.window_seconds.get())),
        settings.rate_limit.max_requests.get(),
    )
    .trusting_forwarded_for(settings.rate_limit.trust_forwarded_for);

    let origin = HeaderValue::from_str(&settings.cors.allowed_origin).map_err(|err| {
        InfraError::configuration(format!(
            "allowed origin `{}` is not a valid header value: {err}",
            settings.cors.allowed_origin
        ))
    })?;

    Ok(HttpState {
        contact: Arc::new(contact),
        rate_limiter: Arc::new(rate_limiter),
        cors: Arc::new(CorsPolicy::new(origin)),
        max_body_bytes: settings.server.max_body_bytes.get(),
    })
}

fn spawn_rate_limit_pruner(limiter: Arc<ContactRateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(limiter.window());
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            limiter.prune();
            debug!(
                target = "contact_relay::ratelimit",
                tracked_callers = limiter.tracked_callers(),
                "rate limit log pruned"
            );
        }
    })
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target = "contact_relay::serve", "shutdown signal received");
}
