pub mod config_registry;
pub mod generator;
pub mod media_server;
pub mod notification;
pub mod scheduler;
pub mod task_queue;
pub mod task_service;
pub mod webhook;

pub use config_registry::{ConfigListener, ConfigRegistry};
pub use generator::StrmGeneratorService;
pub use media_server::MediaServerService;
pub use notification::NotificationEngine;
pub use scheduler::{parse_cron, CronScheduler};
pub use task_queue::{TaskExecutor, TaskQueue};
pub use task_service::TaskService;
pub use webhook::{WebhookAction, WebhookEvent, WebhookHandler};
