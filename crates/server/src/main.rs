use anyhow::{Context, Result};
use routeslot_core::{config::AppConfig, runtime::RouteSlotRuntime};
use server::{
    admin::{create_admin_router, AdminState},
    logging::init_logging,
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(&config.logging);

    info!(
        environment = %config.environment,
        slots = config.slots.total(),
        provider_port = config.server.provider_port,
        admin_port = config.server.admin_port,
        "Starting RouteSlot server"
    );

    let provider_addr = config.provider_addr().map_err(anyhow::Error::msg)?;
    let admin_addr = config.admin_addr().map_err(anyhow::Error::msg)?;

    let runtime = RouteSlotRuntime::builder()
        .with_config(config)
        .build()
        .await
        .context("Runtime initialization failed")?;

    let provider_listener = TcpListener::bind(provider_addr)
        .await
        .with_context(|| format!("Failed to bind provider listener on {provider_addr}"))?;
    let provider_task = runtime.spawn_provider_server(provider_listener);

    match runtime.supervisor().start().await {
        Ok(report) => info!(
            group = %report.group,
            proxy = %report.current_proxy,
            "Routing engine verified; serving workers"
        ),
        Err(e) => {
            runtime.shutdown().await;
            return Err(anyhow::Error::new(e).context("Routing engine failed to start"));
        }
    }

    // Workers are only admitted once the engine is verified and the smoke-test slot is free.
    let admin_listener = match TcpListener::bind(admin_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            runtime.shutdown().await;
            return Err(anyhow::Error::new(e).context(format!("Failed to bind admin listener on {admin_addr}")));
        }
    };
    let admin_app = create_admin_router(AdminState::from_runtime(&runtime));
    let mut admin_shutdown = runtime.shutdown_receiver();
    let admin_task = tokio::spawn(async move {
        info!(address = %admin_addr, "Admin server listening");
        axum::serve(admin_listener, admin_app)
            .with_graceful_shutdown(async move {
                let _ = admin_shutdown.recv().await;
            })
            .await
    });

    shutdown_signal().await;

    runtime.shutdown().await;

    for (name, task) in [("provider", provider_task), ("admin", admin_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(server = name, error = %e, "Server error occurred"),
            Err(e) => error!(server = name, error = %e, "Server task failed"),
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
