pub mod config_entry;
pub mod file_history;
pub mod id;
pub mod notification;
pub mod pagination;
pub mod task;
pub mod task_log;

pub use config_entry::{
    default_value_for, ConfigEntry, MediaServerKind, MediaServerOptions, NotificationOptions,
    StrmOptions, TelegramOptions, WecomOptions, CODE_MEDIA_SERVER, CODE_NOTIFICATION,
    CODE_SOURCE, CODE_STRM, KNOWN_CODES,
};
pub use file_history::{FileHistory, FileType, NewFileHistory, ValidationSummary};
pub use id::{generate_id, FileHistoryId, TaskId, TaskLogId};
pub use notification::{
    ChannelType, NotificationQueueItem, NotificationStatus, TaskResultPayload, TemplateType,
};
pub use pagination::{Page, PageParams};
pub use task::{ConfigType, CreateTaskRequest, MediaType, Task};
pub use task_log::{CounterDelta, FileProcessingStats, StatsRange, TaskLog, TaskStatus};
