//! 请求队列与去重集合
//!
//! 所有发往模型服务商的请求都经过同一个顺序执行的工作任务：
//! 一次只跑一个任务，按提交顺序执行，相邻两次派发的开始时间至少相隔配置的间隔。
//! 任务失败（包括 panic）只会被记录和上报，不会让队列停下。
//!
//! 去重在队列之上完成：调度某个缓存键之前先在 `PendingSet` 中登记，
//! 登记得到的 `PendingGuard` 随任务一起移动，任务结束（无论成败）时释放。

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::translation::core::sink::{StatusReport, StatusSink};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::storage::CacheKey;

// ============================================================================
// 去重集合
// ============================================================================

/// 缓存键在队列中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// 已登记，等待工作任务
    Queued,
    /// 请求已派发
    InFlight,
}

/// 正在处理中的缓存键
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    keys: Arc<Mutex<HashMap<CacheKey, KeyState>>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个键；已经在处理中时返回 `None`
    pub fn try_register(&self, key: &CacheKey) -> Option<PendingGuard> {
        let mut keys = self.lock();
        if keys.contains_key(key) {
            return None;
        }
        keys.insert(key.clone(), KeyState::Queued);
        tracing::debug!("{} → queued", key);

        Some(PendingGuard {
            set: self.clone(),
            key: key.clone(),
        })
    }

    pub fn state(&self, key: &CacheKey) -> Option<KeyState> {
        self.lock().get(key).copied()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, KeyState>> {
        self.keys.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 登记凭证，被丢弃时从集合中移除对应的键
#[derive(Debug)]
pub struct PendingGuard {
    set: PendingSet,
    key: CacheKey,
}

impl PendingGuard {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn mark_in_flight(&self) {
        if let Some(state) = self.set.lock().get_mut(&self.key) {
            *state = KeyState::InFlight;
            tracing::debug!("{} → in flight", self.key);
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
        tracing::trace!("{} released", self.key);
    }
}

// ============================================================================
// 请求队列
// ============================================================================

type Task = BoxFuture<'static, TranslationResult<()>>;

enum Job {
    Run { label: String, task: Task },
    /// 之前提交的任务全部结束后通知
    Barrier(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct QueueCounters {
    submitted: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

/// 队列统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
}

impl QueueStats {
    /// 已提交但尚未派发的任务数
    pub fn waiting(&self) -> u64 {
        self.submitted.saturating_sub(self.dispatched)
    }
}

/// 顺序执行、带最小间隔的请求队列
pub struct RequestQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    interval_ms: Arc<AtomicU64>,
    counters: Arc<QueueCounters>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RequestQueue {
    /// 启动工作任务，必须在 tokio 运行时中调用
    pub fn spawn(interval: Duration, status: Arc<dyn StatusSink>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let interval_ms = Arc::new(AtomicU64::new(interval.as_millis() as u64));
        let counters = Arc::new(QueueCounters::default());

        let worker = tokio::spawn(run_worker(
            receiver,
            Arc::clone(&interval_ms),
            Arc::clone(&counters),
            status,
        ));

        Self {
            sender: Mutex::new(Some(sender)),
            interval_ms,
            counters,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// 提交任务，不等待结果；失败由队列自行上报
    pub fn enqueue<F>(&self, label: impl Into<String>, task: F) -> TranslationResult<()>
    where
        F: Future<Output = TranslationResult<()>> + Send + 'static,
    {
        let job = Job::Run {
            label: label.into(),
            task: task.boxed(),
        };
        self.send(job)?;
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// 提交任务并等待它的结果
    ///
    /// 和其他任务共用同一个间隔限制；任务出错时错误既会上报也会返回给调用方。
    pub async fn run<T, F>(&self, label: impl Into<String>, task: F) -> TranslationResult<T>
    where
        T: Send + 'static,
        F: Future<Output = TranslationResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(label, async move {
            let result = task.await;
            let outcome = match &result {
                Ok(_) => Ok(()),
                Err(e) => Err(e.clone()),
            };
            let _ = tx.send(result);
            outcome
        })?;

        rx.await
            .map_err(|_| TranslationError::InternalError("任务在完成前被中止".to_string()))?
    }

    /// 等待此前提交的所有任务结束
    pub async fn drain(&self) -> TranslationResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Job::Barrier(tx))?;
        rx.await.map_err(|_| TranslationError::QueueClosed)
    }

    /// 调整派发间隔，对下一次派发生效
    pub fn set_interval(&self, interval: Duration) {
        self.interval_ms
            .store(interval.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            dispatched: self.counters.dispatched.load(Ordering::SeqCst),
            succeeded: self.counters.succeeded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            panicked: self.counters.panicked.load(Ordering::SeqCst),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock_sender().as_ref().map_or(true, |s| s.is_closed())
    }

    /// 停止接收新任务，等待已提交的任务跑完
    pub async fn shutdown(&self) {
        self.lock_sender().take();
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!("队列工作任务异常退出: {}", e);
            }
        }
    }

    fn send(&self, job: Job) -> TranslationResult<()> {
        match self.lock_sender().as_ref() {
            Some(sender) => sender.send(job).map_err(|_| TranslationError::QueueClosed),
            None => Err(TranslationError::QueueClosed),
        }
    }

    fn lock_sender(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Job>>> {
        self.sender.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("interval", &self.interval())
            .field("stats", &self.stats())
            .finish()
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    interval_ms: Arc<AtomicU64>,
    counters: Arc<QueueCounters>,
    status: Arc<dyn StatusSink>,
) {
    let mut last_dispatch: Option<Instant> = None;

    while let Some(job) = receiver.recv().await {
        let (label, task) = match job {
            Job::Run { label, task } => (label, task),
            Job::Barrier(done) => {
                let _ = done.send(());
                continue;
            }
        };

        if let Some(last) = last_dispatch {
            let interval = Duration::from_millis(interval_ms.load(Ordering::SeqCst));
            tokio::time::sleep_until(last + interval).await;
        }
        last_dispatch = Some(Instant::now());
        counters.dispatched.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("派发任务: {}", label);

        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(())) => {
                counters.succeeded.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                tracing::warn!("任务失败 {}: {}", label, e);
                status.report(StatusReport::error(format!("{}失败: {}", label, e)));
            }
            Err(_) => {
                counters.panicked.fetch_add(1, Ordering::SeqCst);
                tracing::error!("任务 panic: {}", label);
                status.report(StatusReport::error(format!("{}异常中止", label)));
            }
        }
    }

    tracing::debug!("请求队列已关闭");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::core::sink::LogStatusSink;

    fn key(id: &str) -> CacheKey {
        CacheKey::new("10", id, "EN", "gpt")
    }

    fn queue(interval_ms: u64) -> RequestQueue {
        RequestQueue::spawn(Duration::from_millis(interval_ms), Arc::new(LogStatusSink))
    }

    #[test]
    fn test_pending_set_rejects_duplicates_until_released() {
        let pending = PendingSet::new();
        let guard = pending.try_register(&key("20")).unwrap();
        assert!(pending.try_register(&key("20")).is_none());
        assert_eq!(pending.state(&key("20")), Some(KeyState::Queued));

        guard.mark_in_flight();
        assert_eq!(pending.state(&key("20")), Some(KeyState::InFlight));

        drop(guard);
        assert!(pending.is_empty());
        assert!(pending.try_register(&key("20")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_in_order_with_spacing() {
        let queue = queue(500);
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            queue
                .enqueue(format!("task {}", i), async move {
                    log.lock().unwrap().push((i, Instant::now()));
                    Ok(())
                })
                .unwrap();
        }
        queue.drain().await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
        for pair in log.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_and_panic_do_not_halt_queue() {
        let queue = queue(100);

        queue
            .enqueue("bad", async { Err(TranslationError::EmptyResponse) })
            .unwrap();
        queue
            .enqueue("boom", async {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .unwrap();
        let value = queue.run("good", async { Ok(7) }).await.unwrap();

        assert_eq!(value, 7);
        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_task_error() {
        let queue = queue(100);
        let result: TranslationResult<()> = queue
            .run("bad", async { Err(TranslationError::EmptyResponse) })
            .await;
        assert_eq!(result, Err(TranslationError::EmptyResponse));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_new_work() {
        let queue = queue(100);
        queue.shutdown().await;
        assert!(queue.is_closed());
        assert_eq!(
            queue.enqueue("late", async { Ok(()) }),
            Err(TranslationError::QueueClosed)
        );
    }
}
