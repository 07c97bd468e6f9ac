//! Webhook handler
//!
//! Translates per-file create/delete/rename events addressed to a task
//! into targeted generator operations, bypassing the queue. Paths are
//! normalized to forward slashes and must lie within the task's source
//! prefix.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::models::{StrmOptions, Task, TaskId, CODE_STRM};
use crate::repository::TaskRepository;
use crate::service::config_registry::ConfigRegistry;
use crate::service::generator::{map_source_to_target, stub_file_name, StrmGeneratorService};
use crate::{Error, Result};

/// Event kinds delivered by the remote side.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    Create,
    Delete,
    Rename,
}

/// Webhook payload addressed to a task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub action: WebhookAction,
    #[serde(default)]
    pub is_dir: bool,
    pub source_file: String,
    #[serde(default)]
    pub destination_file: Option<String>,
}

/// Webhook handler
pub struct WebhookHandler {
    task_repo: TaskRepository,
    generator: Arc<StrmGeneratorService>,
    config: Arc<ConfigRegistry>,
}

impl std::fmt::Debug for WebhookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookHandler").finish_non_exhaustive()
    }
}

/// Normalize a path to forward slashes without a trailing slash.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Split a normalized path into (parent, name).
#[must_use]
pub fn split_path(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(idx) => {
            let parent = if idx == 0 { "/" } else { &path[..idx] };
            (parent.to_string(), path[idx + 1..].to_string())
        }
        None => ("/".to_string(), path.to_string()),
    }
}

impl WebhookHandler {
    #[must_use]
    pub fn new(
        task_repo: TaskRepository,
        generator: Arc<StrmGeneratorService>,
        config: Arc<ConfigRegistry>,
    ) -> Self {
        Self {
            task_repo,
            generator,
            config,
        }
    }

    /// Dispatch one event for a task.
    pub async fn handle(&self, task_id: &TaskId, event: &WebhookEvent) -> Result<()> {
        let task = self
            .task_repo
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;

        let source_file = normalize_path(&event.source_file);
        self.check_prefix(&task, &source_file)?;

        match event.action {
            WebhookAction::Create => self.handle_create(&task, &source_file, event.is_dir).await,
            WebhookAction::Delete => self.handle_delete(&task, &source_file, event.is_dir).await,
            WebhookAction::Rename => {
                let destination = event
                    .destination_file
                    .as_deref()
                    .ok_or_else(|| {
                        Error::InvalidInput("rename event without destination".to_string())
                    })
                    .map(normalize_path)?;

                // Atomic pair: drop the old outputs, produce the new ones.
                self.handle_delete(&task, &source_file, event.is_dir).await?;
                self.check_prefix(&task, &destination)?;
                self.handle_create(&task, &destination, event.is_dir).await
            }
        }
    }

    fn check_prefix(&self, task: &Task, path: &str) -> Result<()> {
        let root = normalize_path(&task.source_path);
        let inside = path == root
            || path
                .strip_prefix(&root)
                .is_some_and(|rest| rest.starts_with('/'));
        if inside {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "{path} is outside task source {root}"
            )))
        }
    }

    async fn handle_create(&self, task: &Task, source_file: &str, is_dir: bool) -> Result<()> {
        if is_dir {
            let target = map_source_to_target(task, source_file)
                .ok_or_else(|| Error::InvalidInput(format!("{source_file} unmappable")))?;
            tokio::fs::create_dir_all(&target).await?;
            debug!("created target directory {}", target.display());
            return Ok(());
        }

        let (parent, name) = split_path(source_file);
        info!("webhook create: {name} in {parent}");
        self.generator.process_single_file(task, &parent, &name).await
    }

    async fn handle_delete(&self, task: &Task, source_file: &str, is_dir: bool) -> Result<()> {
        if is_dir {
            let target = map_source_to_target(task, source_file)
                .ok_or_else(|| Error::InvalidInput(format!("{source_file} unmappable")))?;
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                tokio::fs::remove_dir_all(&target).await?;
                info!("removed target directory {}", target.display());
            }
            return Ok(());
        }

        let (parent, name) = split_path(source_file);
        let target_dir = map_source_to_target(task, &parent)
            .ok_or_else(|| Error::InvalidInput(format!("{parent} unmappable")))?;

        let base = match name.rfind('.') {
            Some(idx) if idx > 0 => name[..idx].to_string(),
            _ => name.clone(),
        };

        // The derived stub path is removed explicitly; the sibling sweep
        // below covers companions sharing the base name.
        let options: StrmOptions = self.config.get_parsed(CODE_STRM).await.unwrap_or_default();
        let stub = target_dir.join(stub_file_name(&name, options.replace_suffix));
        remove_if_present(&stub).await;

        let prefix = format!("{base}.");
        match tokio::fs::read_dir(&target_dir).await {
            Ok(mut entries) => {
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let entry_name = entry.file_name().to_string_lossy().into_owned();
                    if entry_name.starts_with(&prefix) {
                        remove_if_present(&entry.path()).await;
                    }
                }
            }
            Err(e) => {
                debug!("target dir {} unreadable: {e}", target_dir.display());
            }
        }

        info!("webhook delete: outputs of {name} removed from {}", target_dir.display());
        Ok(())
    }
}

async fn remove_if_present(path: &PathBuf) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("cannot remove {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("C:\\media\\movies\\"), "C:/media/movies");
        assert_eq!(normalize_path("/a/b/"), "/a/b");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_path("/a/b/c.mp4"),
            ("/a/b".to_string(), "c.mp4".to_string())
        );
        assert_eq!(split_path("/c.mp4"), ("/".to_string(), "c.mp4".to_string()));
        assert_eq!(split_path("c.mp4"), ("/".to_string(), "c.mp4".to_string()));
    }

    #[test]
    fn test_event_deserialization() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{"action":"rename","isDir":false,"sourceFile":"/a/old.mkv","destinationFile":"/a/new.mkv"}"#,
        )
        .unwrap();
        assert_eq!(event.action, WebhookAction::Rename);
        assert_eq!(event.destination_file.as_deref(), Some("/a/new.mkv"));
    }
}
