//! STRM generator
//!
//! The per-task two-stage pipeline. A depth-first scan walks the remote
//! tree, classifies entries, and feeds two queues: media files go to a
//! pool of concurrent stub writers that runs alongside the scan, companion
//! files are collected and downloaded serially after the scan finishes.
//! Counters land in the task log, every output file in the file history,
//! and the terminal state in one notification.

pub mod classify;
pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use strmsync_sources::{adapter::join_path, FileEntry, SourceAdapter};

use crate::models::{
    ConfigType, FileType, NewFileHistory, StrmOptions, Task, TaskId, TaskLogId,
    TaskResultPayload, TaskStatus, TemplateType, CODE_STRM,
};
use crate::repository::{FileHistoryRepository, TaskLogRepository, TaskRepository};
use crate::service::config_registry::ConfigRegistry;
use crate::service::media_server::MediaServerService;
use crate::service::notification::NotificationEngine;
use crate::service::task_queue::TaskExecutor;
use crate::{Error, Result};

use classify::{subtitle_is_paired, Classifier, FileClass};
use stats::{ProcessingStats, RunCounters};

/// Stub workers pull jobs in batches of up to this many.
const STUB_BATCH_SIZE: usize = 100;
/// Humanized pause between successive downloads, milliseconds.
const DOWNLOAD_PAUSE_MIN_MS: u64 = 1000;
const DOWNLOAD_PAUSE_MAX_MS: u64 = 3000;
/// Per-download HTTP timeout.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// A media file awaiting stub generation.
struct StubJob {
    source_dir: String,
    target_dir: PathBuf,
    entry: FileEntry,
}

/// A companion file awaiting download.
struct DownloadJob {
    source_dir: String,
    target_dir: PathBuf,
    entry: FileEntry,
    file_type: FileType,
}

/// Everything one execution shares across its stages.
struct RunContext {
    task: Task,
    options: StrmOptions,
    adapter: Arc<dyn SourceAdapter>,
    stats: ProcessingStats,
    log_id: Option<TaskLogId>,
    history: FileHistoryRepository,
    download_client: reqwest::Client,
}

/// STRM generator service
pub struct StrmGeneratorService {
    cloud: Arc<dyn SourceAdapter>,
    local: Arc<dyn SourceAdapter>,
    task_repo: TaskRepository,
    task_log_repo: TaskLogRepository,
    history_repo: FileHistoryRepository,
    config: Arc<ConfigRegistry>,
    notifier: NotificationEngine,
    media_server: Arc<MediaServerService>,
    download_client: reqwest::Client,
    strm_workers: usize,
}

impl std::fmt::Debug for StrmGeneratorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrmGeneratorService")
            .field("strm_workers", &self.strm_workers)
            .finish_non_exhaustive()
    }
}

impl StrmGeneratorService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cloud: Arc<dyn SourceAdapter>,
        local: Arc<dyn SourceAdapter>,
        task_repo: TaskRepository,
        task_log_repo: TaskLogRepository,
        history_repo: FileHistoryRepository,
        config: Arc<ConfigRegistry>,
        notifier: NotificationEngine,
        media_server: Arc<MediaServerService>,
        strm_workers: usize,
    ) -> Result<Self> {
        let download_client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build download client: {e}")))?;
        Ok(Self {
            cloud,
            local,
            task_repo,
            task_log_repo,
            history_repo,
            config,
            notifier,
            media_server,
            download_client,
            strm_workers: strm_workers.max(1),
        })
    }

    fn adapter_for(&self, config_type: ConfigType) -> Arc<dyn SourceAdapter> {
        match config_type {
            ConfigType::Cloud => Arc::clone(&self.cloud),
            ConfigType::Local => Arc::clone(&self.local),
        }
    }

    /// Run a full task execution. A second call for a task that is already
    /// running is refused.
    pub async fn execute(&self, id: &TaskId) -> Result<()> {
        let task = self
            .task_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        if task.running {
            return Err(Error::TaskRunning);
        }

        self.task_repo.set_running(id, true).await?;
        let outcome = self.run(task).await;
        if let Err(e) = self.task_repo.set_running(id, false).await {
            warn!("failed to reset running flag for task {id}: {e}");
        }
        if let Err(e) = self.task_repo.update_last_run(id, Utc::now()).await {
            warn!("failed to record last run for task {id}: {e}");
        }
        outcome
    }

    async fn run(&self, task: Task) -> Result<()> {
        info!("task {} ({}) starting", task.id, task.name);
        let log = self.task_log_repo.create(&task.id).await?;

        let options: StrmOptions = match self.config.get_parsed(CODE_STRM).await {
            Ok(options) => options,
            Err(e) => {
                error!("task {}: STRM options unavailable: {e}", task.id);
                let message = e.to_string();
                self.task_log_repo
                    .set_status(&log.id, TaskStatus::Failed, &message)
                    .await?;
                self.task_log_repo
                    .update_end_time(&log.id, Utc::now(), 0)
                    .await?;
                self.send_notification(&task, TaskStatus::Failed, 0, &RunCounters::default(), &message)
                    .await;
                return Err(e);
            }
        };

        let adapter = self.adapter_for(task.config_type);
        let classifier = Classifier::new(&task, &options);
        let ctx = Arc::new(RunContext {
            task,
            options,
            adapter,
            stats: ProcessingStats::new(log.id.clone(), self.task_log_repo.clone()),
            log_id: Some(log.id.clone()),
            history: self.history_repo.clone(),
            download_client: self.download_client.clone(),
        });

        // Stub consumers start before the scan so stubs are produced while
        // files are still being discovered. Channel close is the done
        // signal: workers drain what is left and exit.
        let (strm_tx, strm_rx) = mpsc::unbounded_channel::<StubJob>();
        let strm_rx = Arc::new(tokio::sync::Mutex::new(strm_rx));
        let mut workers = Vec::with_capacity(self.strm_workers);
        for _ in 0..self.strm_workers {
            let ctx = Arc::clone(&ctx);
            let rx = Arc::clone(&strm_rx);
            workers.push(tokio::spawn(async move {
                loop {
                    let mut batch = Vec::with_capacity(STUB_BATCH_SIZE);
                    let received = rx.lock().await.recv_many(&mut batch, STUB_BATCH_SIZE).await;
                    if received == 0 {
                        break;
                    }
                    for job in batch {
                        process_stub(&ctx, job).await;
                    }
                }
            }));
        }

        let downloads: Mutex<Vec<DownloadJob>> = Mutex::new(Vec::new());
        let target_root = PathBuf::from(&ctx.task.target_path);
        let scan_result = scan_dir(
            &ctx,
            &classifier,
            ctx.task.source_path.clone(),
            target_root,
            &strm_tx,
            &downloads,
        )
        .await;

        drop(strm_tx);
        for worker in workers {
            let _ = worker.await;
        }

        let (status, message) = match scan_result {
            Ok(()) => {
                let jobs = std::mem::take(&mut *downloads.lock());
                drain_downloads(&ctx, jobs).await;
                (TaskStatus::Completed, String::new())
            }
            Err(ref e) => {
                error!("task {}: scan failed: {e}", ctx.task.id);
                (TaskStatus::Failed, e.to_string())
            }
        };

        ctx.stats.flush().await;
        let totals = ctx.stats.snapshot();
        let end_time = Utc::now();
        let duration = (end_time - log.start_time).num_seconds().max(0);

        self.task_log_repo
            .set_status(&log.id, status, &message)
            .await?;
        self.task_log_repo
            .update_end_time(&log.id, end_time, duration)
            .await?;

        if status == TaskStatus::Completed {
            // Best-effort; failures are logged inside.
            self.media_server.refresh().await;
        }
        self.send_notification(&ctx.task, status, duration, &totals, &message)
            .await;

        info!(
            "task {} finished: {} total, {} generated, {} skipped, {} failed",
            ctx.task.id,
            totals.total_file,
            totals.generated_file,
            totals.skip_file(),
            totals.failed_count
        );
        scan_result
    }

    async fn send_notification(
        &self,
        task: &Task,
        status: TaskStatus,
        duration: i64,
        totals: &RunCounters,
        error_message: &str,
    ) {
        let template = match status {
            TaskStatus::Failed => TemplateType::TaskFailed,
            _ => TemplateType::TaskCompleted,
        };
        let payload = TaskResultPayload {
            task_name: task.name.clone(),
            status: status.to_string(),
            duration,
            source_path: task.source_path.clone(),
            target_path: task.target_path.clone(),
            total_file: totals.total_file,
            generated_file: totals.generated_file,
            skip_file: totals.skip_file(),
            metadata_count: totals.metadata_count,
            subtitle_count: totals.subtitle_count,
            metadata_downloaded: totals.metadata_downloaded,
            subtitle_downloaded: totals.subtitle_downloaded,
            failed_count: totals.failed_count,
            error_message: error_message.to_string(),
            event_time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        self.notifier.notify_task_result(template, &payload).await;
    }

    /// Webhook entry: process one file the way the scanner would, outside
    /// any queued execution.
    pub async fn process_single_file(
        &self,
        task: &Task,
        source_dir: &str,
        file_name: &str,
    ) -> Result<()> {
        let options: StrmOptions = self.config.get_parsed(CODE_STRM).await?;
        let adapter = self.adapter_for(task.config_type);
        let classifier = Classifier::new(task, &options);

        let entries = adapter.list(source_dir).await?;
        let entry = entries
            .into_iter()
            .find(|e| e.name == file_name && !e.is_dir)
            .ok_or_else(|| Error::NotFound(format!("{file_name} not found in {source_dir}")))?;

        let target_dir = map_source_to_target(task, source_dir)
            .ok_or_else(|| Error::InvalidInput(format!("{source_dir} outside task source")))?;
        tokio::fs::create_dir_all(&target_dir).await?;

        let ctx = Arc::new(RunContext {
            task: task.clone(),
            options,
            adapter,
            stats: ProcessingStats::detached(),
            log_id: None,
            history: self.history_repo.clone(),
            download_client: self.download_client.clone(),
        });

        let class = classifier.classify(&entry);
        match class {
            FileClass::Media => {
                if let Some(min) = ctx.options.min_file_size_bytes() {
                    if entry.size < min {
                        debug!("{file_name} below size threshold, skipped");
                        return Ok(());
                    }
                }
                process_stub(
                    &ctx,
                    StubJob {
                        source_dir: source_dir.to_string(),
                        target_dir,
                        entry,
                    },
                )
                .await;
            }
            FileClass::Metadata | FileClass::Subtitle => {
                let file_type = if class == FileClass::Metadata {
                    FileType::Metadata
                } else {
                    FileType::Subtitle
                };
                process_download(
                    &ctx,
                    DownloadJob {
                        source_dir: source_dir.to_string(),
                        target_dir,
                        entry,
                        file_type,
                    },
                )
                .await;
            }
            FileClass::Other => {
                debug!("{file_name} classified as other, nothing to do");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TaskExecutor for StrmGeneratorService {
    async fn execute(&self, id: TaskId) {
        if let Err(e) = StrmGeneratorService::execute(self, &id).await {
            warn!("task {id} execution failed: {e}");
        }
    }
}

/// Derive the stub file name from a media file name.
#[must_use]
pub fn stub_file_name(media_name: &str, replace_suffix: bool) -> String {
    if replace_suffix {
        match media_name.rfind('.') {
            Some(idx) if idx > 0 => format!("{}.strm", &media_name[..idx]),
            _ => format!("{media_name}.strm"),
        }
    } else {
        format!("{media_name}.strm")
    }
}

/// Map a source directory to the corresponding target directory, or `None`
/// when the directory is outside the task's source prefix.
#[must_use]
pub fn map_source_to_target(task: &Task, source_dir: &str) -> Option<PathBuf> {
    let root = task.source_path.trim_end_matches('/');
    let dir = source_dir.trim_end_matches('/');
    let rel = if dir == root {
        ""
    } else {
        dir.strip_prefix(root)?.strip_prefix('/')?
    };
    let mut target = PathBuf::from(&task.target_path);
    if !rel.is_empty() {
        target.push(rel);
    }
    Some(target)
}

/// Depth-first scan of one directory.
fn scan_dir<'a>(
    ctx: &'a Arc<RunContext>,
    classifier: &'a Classifier,
    source_dir: String,
    target_dir: PathBuf,
    strm_tx: &'a mpsc::UnboundedSender<StubJob>,
    downloads: &'a Mutex<Vec<DownloadJob>>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let entries = ctx.adapter.list(&source_dir).await?;

        let mut dirs = Vec::new();
        let mut media = Vec::new();
        let mut metadata = Vec::new();
        let mut subtitles = Vec::new();

        for entry in entries {
            if entry.is_dir {
                dirs.push(entry);
                continue;
            }
            ctx.stats.record(|c| c.total_file += 1).await;
            match classifier.classify(&entry) {
                FileClass::Media => media.push(entry),
                FileClass::Metadata => metadata.push(entry),
                FileClass::Subtitle => subtitles.push(entry),
                FileClass::Other => {
                    ctx.stats.record(|c| c.other_skipped += 1).await;
                }
            }
        }

        // Size filter drops undersized media.
        let min_size = ctx.options.min_file_size_bytes();
        let mut kept_media = Vec::with_capacity(media.len());
        for entry in media {
            if min_size.is_some_and(|min| entry.size < min) {
                debug!("{} below size threshold, skipped", entry.name);
                ctx.stats.record(|c| c.media_skipped += 1).await;
            } else {
                kept_media.push(entry);
            }
        }

        // Subtitle pairing against this directory's media stems.
        let media_bases: Vec<&str> = kept_media.iter().map(FileEntry::base_name).collect();
        let mut paired_subtitles = Vec::with_capacity(subtitles.len());
        for entry in subtitles {
            ctx.stats.record(|c| c.subtitle_count += 1).await;
            if subtitle_is_paired(entry.base_name(), &media_bases) {
                paired_subtitles.push(entry);
            } else {
                debug!("{} has no matching media, skipped", entry.name);
                ctx.stats.record(|c| c.subtitle_skipped += 1).await;
            }
        }
        for _ in &metadata {
            ctx.stats.record(|c| c.metadata_count += 1).await;
        }

        // Existing targets suppress the download but still refresh history.
        let candidates = metadata
            .into_iter()
            .map(|entry| (entry, FileType::Metadata))
            .chain(
                paired_subtitles
                    .into_iter()
                    .map(|entry| (entry, FileType::Subtitle)),
            );
        for (entry, file_type) in candidates {
            let target = target_dir.join(&entry.name);
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                ctx.stats
                    .record(|c| match file_type {
                        FileType::Subtitle => c.subtitle_skipped += 1,
                        _ => c.metadata_skipped += 1,
                    })
                    .await;
                record_history(ctx, &source_dir, &entry, file_type, &target).await;
            } else {
                downloads.lock().push(DownloadJob {
                    source_dir: source_dir.clone(),
                    target_dir: target_dir.clone(),
                    entry,
                    file_type,
                });
            }
        }

        for entry in kept_media {
            let _ = strm_tx.send(StubJob {
                source_dir: source_dir.clone(),
                target_dir: target_dir.clone(),
                entry,
            });
        }

        for dir in dirs {
            let sub_source = join_path(&source_dir, &dir.name);
            let sub_target = target_dir.join(&dir.name);
            if let Err(e) = tokio::fs::create_dir_all(&sub_target).await {
                warn!("cannot create {}: {e}", sub_target.display());
                ctx.stats.record(|c| c.failed_count += 1).await;
                continue;
            }
            scan_dir(ctx, classifier, sub_source, sub_target, strm_tx, downloads).await?;
        }

        Ok(())
    })
}

/// Write one `.strm` stub.
async fn process_stub(ctx: &RunContext, job: StubJob) {
    let entry = &job.entry;
    let url = match ctx
        .adapter
        .file_url(
            &job.source_dir,
            &entry.name,
            entry.sign.as_deref(),
            ctx.options.url_encode,
        )
        .await
    {
        Ok(url) => url,
        Err(e) => {
            warn!("no URL for {}: {e}", entry.name);
            ctx.stats.record(|c| c.failed_count += 1).await;
            return;
        }
    };

    let stub_name = stub_file_name(&entry.name, ctx.options.replace_suffix);
    let target = job.target_dir.join(&stub_name);

    let existed = tokio::fs::try_exists(&target).await.unwrap_or(false);
    if existed && !ctx.task.overwrite {
        debug!("{} exists, stub skipped", target.display());
        ctx.stats.record(|c| c.media_skipped += 1).await;
        record_history(ctx, &job.source_dir, entry, FileType::Media, &target).await;
        return;
    }

    if let Some(parent) = target.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!("cannot create {}: {e}", parent.display());
            ctx.stats.record(|c| c.failed_count += 1).await;
            return;
        }
    }
    if let Err(e) = tokio::fs::write(&target, url.as_bytes()).await {
        warn!("cannot write {}: {e}", target.display());
        ctx.stats.record(|c| c.failed_count += 1).await;
        return;
    }

    ctx.stats
        .record(|c| {
            c.generated_file += 1;
            if existed {
                c.overwrite_file += 1;
            }
        })
        .await;
    record_history(ctx, &job.source_dir, entry, FileType::Media, &target).await;
}

/// Serial download drain with a humanized cadence between requests.
async fn drain_downloads(ctx: &RunContext, jobs: Vec<DownloadJob>) {
    if jobs.is_empty() {
        return;
    }
    info!("draining {} downloads", jobs.len());
    let mut first = true;
    for job in jobs {
        if !first {
            let pause = {
                let mut rng = rand::thread_rng();
                rng.gen_range(DOWNLOAD_PAUSE_MIN_MS..=DOWNLOAD_PAUSE_MAX_MS)
            };
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
        first = false;
        process_download(ctx, job).await;
    }
}

/// Download one companion file and record its history.
async fn process_download(ctx: &RunContext, job: DownloadJob) {
    let entry = &job.entry;
    let file_type = job.file_type;
    let target = job.target_dir.join(&entry.name);

    let outcome = match ctx
        .adapter
        .file_url(
            &job.source_dir,
            &entry.name,
            entry.sign.as_deref(),
            ctx.options.url_encode,
        )
        .await
    {
        Ok(url) => fetch_to_file(ctx, &url, &target).await,
        Err(e) => Err(Error::from(e)),
    };

    match outcome {
        Ok(()) => {
            ctx.stats
                .record(|c| match file_type {
                    FileType::Subtitle => c.subtitle_downloaded += 1,
                    _ => c.metadata_downloaded += 1,
                })
                .await;
            record_history(ctx, &job.source_dir, entry, file_type, &target).await;
        }
        Err(e) => {
            warn!("download of {} failed: {e}", entry.name);
            ctx.stats
                .record(|c| {
                    c.failed_count += 1;
                    match file_type {
                        FileType::Subtitle => c.subtitle_skipped += 1,
                        _ => c.metadata_skipped += 1,
                    }
                })
                .await;
        }
    }
}

/// Fetch a URL (or copy a local path) into the target file.
async fn fetch_to_file(ctx: &RunContext, url: &str, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Internal(format!("create {}: {e}", parent.display())))?;
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        let response = ctx
            .download_client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Internal(format!("http status {status}")));
        }

        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| Error::Internal(format!("create {}: {e}", target.display())))?;
        let mut response = response;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::Internal(format!("read body: {e}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::Internal(format!("write {}: {e}", target.display())))?;
        }
        file.flush()
            .await
            .map_err(|e| Error::Internal(format!("flush {}: {e}", target.display())))?;
    } else {
        // Local source: the "URL" is a filesystem path.
        tokio::fs::copy(url, target)
            .await
            .map_err(|e| Error::Internal(format!("copy {url}: {e}")))?;
    }
    Ok(())
}

/// Record or refresh the file-history row for one output file. Companion
/// records link to the main file in the same source directory when one is
/// already known.
async fn record_history(
    ctx: &RunContext,
    source_dir: &str,
    entry: &FileEntry,
    file_type: FileType,
    target: &Path,
) {
    let is_main_file = file_type == FileType::Media;
    let main_file_id = if is_main_file {
        None
    } else {
        match ctx.history.list_main_by_source_path(source_dir).await {
            Ok(mains) => mains
                .into_iter()
                .find(|main| {
                    let stem = match main.file_name.rfind('.') {
                        Some(idx) if idx > 0 => &main.file_name[..idx],
                        _ => main.file_name.as_str(),
                    };
                    entry.base_name().starts_with(stem)
                })
                .map(|main| main.id),
            Err(e) => {
                debug!("main-file lookup failed for {source_dir}: {e}");
                None
            }
        }
    };

    let new = NewFileHistory {
        task_id: ctx.task.id.clone(),
        task_log_id: ctx.log_id.clone(),
        file_name: entry.name.clone(),
        source_path: source_dir.to_string(),
        target_file_path: target.to_string_lossy().into_owned(),
        file_size: entry.size,
        file_type,
        file_suffix: entry.extension(),
        is_main_file,
        main_file_id,
        hash: entry.hash_sha1.clone(),
        modified_at: entry.modified,
    };
    if let Err(e) = ctx.history.upsert(&new).await {
        warn!("file history for {} not recorded: {e}", entry.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaType;

    #[test]
    fn test_stub_file_name() {
        assert_eq!(stub_file_name("movie.mp4", true), "movie.strm");
        assert_eq!(stub_file_name("movie.mp4", false), "movie.mp4.strm");
        assert_eq!(stub_file_name("noext", true), "noext.strm");
        assert_eq!(stub_file_name("a.b.mkv", true), "a.b.strm");
    }

    fn task_with_paths(source: &str, target: &str) -> Task {
        Task {
            id: TaskId::new(),
            name: "t".to_string(),
            media_type: MediaType::Movie,
            source_path: source.to_string(),
            target_path: target.to_string(),
            config_type: ConfigType::Cloud,
            file_suffix: String::new(),
            metadata_extensions: String::new(),
            subtitle_extensions: String::new(),
            download_metadata: false,
            download_subtitle: false,
            overwrite: false,
            enabled: true,
            cron: String::new(),
            running: false,
            last_run_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_map_source_to_target() {
        let task = task_with_paths("/media/movies", "/library/movies");
        assert_eq!(
            map_source_to_target(&task, "/media/movies"),
            Some(PathBuf::from("/library/movies"))
        );
        assert_eq!(
            map_source_to_target(&task, "/media/movies/2024/action"),
            Some(PathBuf::from("/library/movies/2024/action"))
        );
        assert_eq!(map_source_to_target(&task, "/media/shows"), None);
        // A sibling prefix is not inside the source path.
        assert_eq!(map_source_to_target(&task, "/media/moviesarchive"), None);
    }
}
