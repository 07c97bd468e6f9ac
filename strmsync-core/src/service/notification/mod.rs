//! Notification engine
//!
//! At-least-once delivery of task-outcome notifications with bounded retry
//! and durable state. Items are persisted first; an in-memory channel of
//! capacity 1000 feeds a single consumer. When the channel is full the
//! item stays durable-only and is recovered by the next bulk load. Retries
//! re-enqueue through fire-and-forget delay tasks; a daily ticker purges
//! old sent items. The consumer runs only while the engine is eligible:
//! notifications enabled and at least one channel usable.

pub mod channel;
pub mod telegram;
pub mod template;
pub mod wecom;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    ChannelType, NotificationOptions, NotificationStatus, TaskResultPayload, TemplateType,
};
use crate::repository::NotificationQueueRepository;
use crate::{Error, Result};

use channel::{build_channels, NotificationChannel};
use template::TemplateRenderer;

/// In-memory queue capacity; overflow falls back to durable-only.
const CHANNEL_CAPACITY: usize = 1000;
/// Grace period after signalling the consumer to stop.
const STOP_GRACE: Duration = Duration::from_millis(100);
/// Purge cadence and retention for sent items.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const SENT_RETENTION_DAYS: i64 = 30;

struct EngineState {
    options: NotificationOptions,
    channels: HashMap<ChannelType, Arc<dyn NotificationChannel>>,
    tx: Option<mpsc::Sender<Uuid>>,
    stop_tx: Option<watch::Sender<bool>>,
    consumer: Option<JoinHandle<()>>,
    cleanup: Option<JoinHandle<()>>,
}

struct EngineInner {
    repo: NotificationQueueRepository,
    renderer: TemplateRenderer,
    state: RwLock<EngineState>,
}

/// Notification engine
#[derive(Clone)]
pub struct NotificationEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for NotificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationEngine").finish_non_exhaustive()
    }
}

impl NotificationEngine {
    pub fn new(repo: NotificationQueueRepository) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(EngineInner {
                repo,
                renderer: TemplateRenderer::new()?,
                state: RwLock::new(EngineState {
                    options: NotificationOptions::default(),
                    channels: HashMap::new(),
                    tx: None,
                    stop_tx: None,
                    consumer: None,
                    cleanup: None,
                }),
            }),
        })
    }

    /// Apply a raw `notification` config value. Absent or malformed config
    /// disables the engine.
    pub async fn apply_raw(&self, raw: Option<&str>) {
        let options = raw
            .and_then(|value| {
                serde_json::from_str::<NotificationOptions>(value)
                    .map_err(|e| warn!("malformed notification config: {e}"))
                    .ok()
            })
            .unwrap_or_default();
        self.apply_options(options).await;
    }

    /// Rebuild channels and flip the consumer gate as eligibility changes.
    pub async fn apply_options(&self, options: NotificationOptions) {
        let channels = build_channels(&options);
        let eligible =
            options.enabled && channels.values().any(|channel| channel.is_enabled());

        let mut state = self.inner.state.write().await;
        state.options = options;
        state.channels = channels;

        let running = state.consumer.is_some();
        if running && !eligible {
            info!("notification engine no longer eligible, stopping consumer");
            stop_locked(&mut state).await;
        } else if !running && eligible {
            info!("notification engine eligible, starting consumer");
            self.start_locked(&mut state);
            drop(state);
            self.bulk_load().await;
        }
    }

    /// Stop the consumer and ticker if running.
    pub async fn stop(&self) {
        let mut state = self.inner.state.write().await;
        if state.consumer.is_some() {
            stop_locked(&mut state).await;
        }
    }

    fn start_locked(&self, state: &mut EngineState) {
        let (tx, mut rx) = mpsc::channel::<Uuid>(CHANNEL_CAPACITY);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let engine = self.clone();
        let consumer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    next = rx.recv() => {
                        match next {
                            Some(id) => engine.process_item(id).await,
                            None => break,
                        }
                    }
                }
            }
            debug!("notification consumer exited");
        });

        let repo = self.inner.repo.clone();
        let cleanup = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let cutoff = Utc::now() - chrono::Duration::days(SENT_RETENTION_DAYS);
                match repo.purge_sent_before(cutoff).await {
                    Ok(purged) if purged > 0 => {
                        info!("purged {purged} sent notifications");
                    }
                    Ok(_) => {}
                    Err(e) => warn!("notification cleanup failed: {e}"),
                }
            }
        });

        state.tx = Some(tx);
        state.stop_tx = Some(stop_tx);
        state.consumer = Some(consumer);
        state.cleanup = Some(cleanup);
    }

    /// Reload every pending item from the store: due items enter the
    /// channel in due order, future retries get delay tasks.
    async fn bulk_load(&self) {
        let pending = match self.inner.repo.list_pending().await {
            Ok(items) => items,
            Err(e) => {
                warn!("failed to bulk-load pending notifications: {e}");
                return;
            }
        };
        if pending.is_empty() {
            return;
        }
        info!("bulk-loaded {} pending notifications", pending.len());

        let now = Utc::now();
        for item in pending {
            match item.next_retry_time {
                Some(due) if due > now => {
                    let delay = (due - now).to_std().unwrap_or_default();
                    self.schedule_delayed(item.id, delay);
                }
                _ => self.try_push(item.id).await,
            }
        }
    }

    /// Persist and enqueue one task-result notification addressed to
    /// exactly one channel. Chooses the first enabled channel; with none
    /// enabled the notification is dropped.
    pub async fn notify_task_result(
        &self,
        template: TemplateType,
        payload: &TaskResultPayload,
    ) {
        let channel_type = {
            let state = self.inner.state.read().await;
            if !state.options.enabled {
                debug!("notifications disabled, skipping");
                return;
            }
            let enabled = |ct: &ChannelType| {
                state
                    .channels
                    .get(ct)
                    .is_some_and(|channel| channel.is_enabled())
            };
            if enabled(&ChannelType::Telegram) {
                ChannelType::Telegram
            } else if enabled(&ChannelType::Wecom) {
                ChannelType::Wecom
            } else {
                debug!("no notification channel enabled, skipping");
                return;
            }
        };

        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("notification payload not serializable: {e}");
                return;
            }
        };

        match self.inner.repo.create(channel_type, template, &value).await {
            Ok(item) => self.try_push(item.id).await,
            Err(e) => warn!("failed to persist notification: {e}"),
        }
    }

    /// Hand an item ID to the consumer. Channel full or consumer stopped
    /// means durable-only: the item waits for the next bulk load.
    async fn try_push(&self, id: Uuid) {
        let state = self.inner.state.read().await;
        match &state.tx {
            Some(tx) => {
                if let Err(e) = tx.try_send(id) {
                    debug!("notification {id} stays durable-only: {e}");
                }
            }
            None => debug!("notification {id} stays durable-only: consumer stopped"),
        }
    }

    fn schedule_delayed(&self, id: Uuid, delay: Duration) {
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.try_push(id).await;
        });
    }

    /// One state-machine step for an item.
    async fn process_item(&self, id: Uuid) {
        let item = match self.inner.repo.get_by_id(id).await {
            Ok(Some(item)) => item,
            Ok(None) => return,
            Err(e) => {
                warn!("cannot read notification {id}: {e}");
                return;
            }
        };
        if item.status != NotificationStatus::Pending {
            return;
        }

        // Woken early: push the wait back onto a delay task.
        let now = Utc::now();
        if let Some(due) = item.next_retry_time {
            if due > now {
                let delay = (due - now).to_std().unwrap_or_default();
                self.schedule_delayed(id, delay);
                return;
            }
        }

        match self.inner.repo.mark_processing(id).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!("cannot claim notification {id}: {e}");
                return;
            }
        }

        let (channel, retry_max, retry_interval) = {
            let state = self.inner.state.read().await;
            (
                state.channels.get(&item.channel_type).cloned(),
                state.options.retry_max(),
                state.options.retry_interval_secs(),
            )
        };

        let outcome = match channel {
            Some(channel) if channel.is_enabled() => {
                match self.inner.renderer.render(item.template_type, &item.payload) {
                    Ok(text) => channel.send(item.template_type, &text).await,
                    Err(e) => Err(e),
                }
            }
            _ => Err(Error::Internal(format!(
                "channel {} unavailable",
                item.channel_type
            ))),
        };

        match outcome {
            Ok(()) => {
                if let Err(e) = self.inner.repo.mark_sent(id).await {
                    warn!("cannot mark notification {id} sent: {e}");
                }
                debug!("notification {id} sent via {}", item.channel_type);
            }
            Err(send_err) => {
                if item.retry_count < retry_max {
                    let next = now + chrono::Duration::seconds(retry_interval);
                    if let Err(e) = self
                        .inner
                        .repo
                        .reschedule(id, next, &send_err.to_string())
                        .await
                    {
                        warn!("cannot reschedule notification {id}: {e}");
                        return;
                    }
                    debug!(
                        "notification {id} rescheduled (retry {}/{retry_max})",
                        item.retry_count + 1
                    );
                    self.schedule_delayed(
                        id,
                        Duration::from_secs(retry_interval.max(0) as u64),
                    );
                } else {
                    warn!("notification {id} failed permanently: {send_err}");
                    if let Err(e) = self.inner.repo.mark_failed(id, &send_err.to_string()).await {
                        warn!("cannot mark notification {id} failed: {e}");
                    }
                }
            }
        }
    }
}

/// Close the consumer: stop signal, short grace, then hard abort.
async fn stop_locked(state: &mut EngineState) {
    if let Some(stop_tx) = state.stop_tx.take() {
        let _ = stop_tx.send(true);
    }
    state.tx = None;
    tokio::time::sleep(STOP_GRACE).await;
    if let Some(consumer) = state.consumer.take() {
        consumer.abort();
    }
    if let Some(cleanup) = state.cleanup.take() {
        cleanup.abort();
    }
}
