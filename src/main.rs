use clap::Parser;
use fsproxy::Proxy;
use tokio_util::sync::CancellationToken;

mod config;

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("notify", log::LevelFilter::Warn)
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();

    let config = config::Args::parse()
        .into_proxy_config()
        .unwrap_or_else(|e| {
            log::error!("Invalid configuration: {:#}", e);
            std::process::exit(2);
        });

    let proxy = Proxy::new(config).unwrap_or_else(|e| {
        log::error!("Failed to create proxy: {:#}", e);
        std::process::exit(1);
    });

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown requested, draining in-flight requests");
        cancel_clone.cancel();
    });

    let result = proxy.run(cancel).await;
    if let Err(e) = proxy.close().await {
        log::warn!("Failed to close proxy: {:#}", e);
    }

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            log::error!("Crash proxy: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
                return;
            }
            Err(e) => log::warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
