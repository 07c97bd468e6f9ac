pub mod config;
pub mod file_history;
pub mod notification_queue;
pub mod task;
pub mod task_log;

pub use config::ConfigRepository;
pub use file_history::FileHistoryRepository;
pub use notification_queue::NotificationQueueRepository;
pub use task::TaskRepository;
pub use task_log::TaskLogRepository;
