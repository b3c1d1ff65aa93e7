use std::time::Duration;
use tracing::{info, warn};

use handoff::browser::ChromiumLauncher;
use handoff::{api, AppState, Settings};

/// How long shutdown waits for running sessions to release their browsers.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(p) = args.next().and_then(|v| v.parse::<u16>().ok()) {
                return Some(p);
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut settings = Settings::load();
    if let Some(port) = parse_port_from_args() {
        settings.port = port;
    }

    if !ChromiumLauncher::new(settings.browser.clone()).browser_available() {
        warn!("No Chrome/Chromium found; sessions will fail with BROWSER_UNAVAILABLE until one is installed or CHROME_EXECUTABLE is set.");
    }
    info!(
        "browser mode: {}, profiles under {}",
        if settings.browser.headless { "headless" } else { "headed" },
        settings.browser.profile_root.display()
    );

    let port = settings.port;
    let state = AppState::new(settings);
    let app = api::router(state.clone());

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set HANDOFF_PORT/PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("handoff listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: AppState) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutting down; interrupting running sessions");
    state.manager.shutdown(SHUTDOWN_GRACE).await;
}
