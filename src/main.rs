use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use sqs_broker::clock::{Clock, SystemClock};
use sqs_broker::config::Args;
use sqs_broker::sqs::dispatcher;
use sqs_broker::sqs::manager::QueueManager;
use sqs_broker::sqs::server::{self, SqsService};
use sqs_broker::sqs::snapshot;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let base_url = format!("http://{}:{}/{}", args.bind_address, args.port, args.account_id);
    let manager = Arc::new(QueueManager::new(
        clock.clone(),
        base_url,
        args.region.clone(),
        args.account_id.clone(),
    ));

    if let Some(ref path) = args.snapshot_path {
        let path = PathBuf::from(path);
        if let Err(err) = snapshot::load(&manager, &path, &clock) {
            tracing::warn!(error = %err, "failed to load snapshot, starting empty");
        } else {
            tracing::info!(path = %path.display(), "loaded snapshot");
        }
    }

    dispatcher::spawn(
        manager.clone(),
        Duration::from_millis(args.dispatcher_tick_millis as u64),
    );

    if let Some(ref path) = args.snapshot_path {
        let manager = manager.clone();
        let path = PathBuf::from(path);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                if let Err(err) = snapshot::save(&manager, &path) {
                    tracing::warn!(error = %err, "failed to write snapshot");
                }
            }
        });
    }

    let service = Arc::new(SqsService::new(manager.clone()));
    let router = server::create_router(service);

    let addr = format!("{}:{}", args.bind_address, args.port);
    tracing::info!(%addr, "sqs-broker listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listen address");

    let snapshot_path = args.snapshot_path.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            if let Some(path) = snapshot_path {
                if let Err(err) = snapshot::save(&manager, &PathBuf::from(path)) {
                    tracing::warn!(error = %err, "failed to write snapshot on shutdown");
                }
            }
        })
        .await
        .expect("server error");
}
