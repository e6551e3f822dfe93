//! Service wiring: storage, processors, coordinator and queue consumers.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;

use assetline_core::Config;
use assetline_db::{PgCoordinatorStore, PgMessageQueue, PgSessionCache};
use assetline_infra::{CompletionNotifier, NoopNotifier, RecordStoreNotifier};
use assetline_processing::ProcessorRegistry;
use assetline_storage::create_storage;
use assetline_worker::{CoordinatorService, DispatchContext, Dispatcher};

use crate::state::AppState;

pub async fn initialize_services(
    config: &Config,
    pool: PgPool,
) -> Result<(Arc<AppState>, Dispatcher)> {
    let storage = create_storage(&config.storage)
        .await
        .context("Failed to initialize storage backend")?;
    tracing::info!(backend = %storage.backend_type(), "Storage initialized");

    let registry = ProcessorRegistry::from_config(storage, &config.processing)
        .context("Failed to initialize task processors")?;

    let notifier: Arc<dyn CompletionNotifier> =
        if config.notifier.record_store_base_url.is_some() {
            Arc::new(RecordStoreNotifier::new(&config.notifier)?)
        } else {
            tracing::warn!("RECORD_STORE_BASE_URL not set; completion notifications disabled");
            Arc::new(NoopNotifier)
        };

    let coordinator = CoordinatorService::new(
        Arc::new(PgCoordinatorStore::new(pool.clone())),
        notifier,
    );
    let queue = Arc::new(PgMessageQueue::new(
        pool.clone(),
        config.queue.max_delivery_attempts,
    ));

    let context = Arc::new(DispatchContext {
        coordinator: coordinator.clone(),
        queue: queue.clone(),
        sessions: Arc::new(PgSessionCache::new(pool.clone())),
        registry,
        queues: config.queue.clone(),
        default_bucket: config.storage.default_bucket.clone(),
    });

    let state = Arc::new(AppState {
        coordinator,
        queue,
        upload_event_queue: config.queue.upload_event_queue.clone(),
        pool: Some(pool),
    });

    Ok((state, Dispatcher::new(context)))
}
