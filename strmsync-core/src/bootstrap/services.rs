//! Service initialization and dependency injection

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use strmsync_sources::{CloudSourceAdapter, LocalSourceAdapter, SourceAdapter};

use crate::{
    models::{CODE_MEDIA_SERVER, CODE_NOTIFICATION, CODE_SOURCE},
    repository::{
        ConfigRepository, FileHistoryRepository, NotificationQueueRepository, TaskLogRepository,
        TaskRepository,
    },
    service::{
        ConfigRegistry, CronScheduler, MediaServerService, NotificationEngine,
        StrmGeneratorService, TaskExecutor, TaskQueue, TaskService, WebhookHandler,
    },
    Config,
};

/// Container for all initialized services
#[derive(Clone)]
pub struct Services {
    /// Config registry and listener bus
    pub config_registry: Arc<ConfigRegistry>,
    /// Cloud source adapter (shared with the generator)
    pub cloud_source: Arc<CloudSourceAdapter>,
    /// Task orchestration service
    pub task_service: Arc<TaskService>,
    /// The task execution pipeline
    pub generator: Arc<StrmGeneratorService>,
    /// Single-consumer task queue
    pub queue: TaskQueue,
    /// Cron scheduler
    pub scheduler: CronScheduler,
    /// Notification engine
    pub notifier: NotificationEngine,
    /// Webhook handler
    pub webhook: Arc<WebhookHandler>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Initialize all core services
pub async fn init_services(pool: PgPool, config: &Config) -> Result<Services, anyhow::Error> {
    info!("Initializing services...");

    // Repositories
    let config_repo = ConfigRepository::new(pool.clone());
    let task_repo = TaskRepository::new(pool.clone());
    let task_log_repo = TaskLogRepository::new(pool.clone());
    let history_repo = FileHistoryRepository::new(pool.clone());
    let notification_repo = NotificationQueueRepository::new(pool);

    // Config registry seeds defaults and caches every record.
    let config_registry = Arc::new(ConfigRegistry::new(config_repo));
    config_registry.initialize().await?;

    // Source adapters
    let cloud_source = Arc::new(CloudSourceAdapter::new());
    let local_source = Arc::new(LocalSourceAdapter::new());

    // Notification engine and media-server integration
    let notifier = NotificationEngine::new(notification_repo)?;
    let media_server = Arc::new(MediaServerService::new());

    // Generator
    let generator = Arc::new(StrmGeneratorService::new(
        Arc::clone(&cloud_source) as Arc<dyn SourceAdapter>,
        local_source as Arc<dyn SourceAdapter>,
        task_repo.clone(),
        task_log_repo.clone(),
        history_repo.clone(),
        Arc::clone(&config_registry),
        notifier.clone(),
        Arc::clone(&media_server),
        config.generator.strm_workers,
    )?);

    // Queue and scheduler
    let queue = TaskQueue::new();
    let scheduler = CronScheduler::new(task_repo.clone(), queue.clone());

    let task_service = Arc::new(TaskService::new(
        task_repo.clone(),
        task_log_repo,
        history_repo,
        queue.clone(),
        scheduler.clone(),
    ));

    let webhook = Arc::new(WebhookHandler::new(
        task_repo,
        Arc::clone(&generator),
        Arc::clone(&config_registry),
    ));

    // Config listeners: each subscriber rebuilds its state on update.
    register_listeners(&config_registry, &cloud_source, &notifier, &media_server).await;

    // Stale running flags are meaningless after a restart.
    task_service.reset_running_flags().await?;

    // Seed subscriber state from the freshly loaded cache, then start the
    // engine pieces.
    config_registry.notify_all_known().await;
    queue
        .start(Arc::clone(&generator) as Arc<dyn TaskExecutor>)
        .await;
    scheduler.start().await?;

    // Probe the cloud source once the listener has had a chance to seed it.
    let probe = Arc::clone(&cloud_source);
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        match probe.test_connection().await {
            Ok(()) => info!("cloud source reachable"),
            Err(e) => tracing::warn!("cloud source unavailable: {e}"),
        }
    });

    info!("Services initialized");
    Ok(Services {
        config_registry,
        cloud_source,
        task_service,
        generator,
        queue,
        scheduler,
        notifier,
        webhook,
    })
}

async fn register_listeners(
    config_registry: &Arc<ConfigRegistry>,
    cloud_source: &Arc<CloudSourceAdapter>,
    notifier: &NotificationEngine,
    media_server: &Arc<MediaServerService>,
) {
    let source = Arc::clone(cloud_source);
    config_registry
        .register(
            CODE_SOURCE,
            Arc::new(move |value| {
                let source = Arc::clone(&source);
                Box::pin(async move {
                    source.apply_config(value.as_deref()).await;
                })
            }),
        )
        .await;

    let engine = notifier.clone();
    config_registry
        .register(
            CODE_NOTIFICATION,
            Arc::new(move |value| {
                let engine = engine.clone();
                Box::pin(async move {
                    engine.apply_raw(value.as_deref()).await;
                })
            }),
        )
        .await;

    let media = Arc::clone(media_server);
    config_registry
        .register(
            CODE_MEDIA_SERVER,
            Arc::new(move |value| {
                let media = Arc::clone(&media);
                Box::pin(async move {
                    media.apply_raw(value.as_deref()).await;
                })
            }),
        )
        .await;
}

/// Shut the engine pieces down in dependency order; in-flight executions
/// finish naturally.
pub async fn shutdown_services(services: &Services) {
    services.scheduler.stop();
    services.queue.shutdown().await;
    services.notifier.stop().await;
    info!("Services stopped");
}
