//! 防抖执行器
//!
//! 在安静窗口内的多次触发合并为一次执行。动作在触发时不会捕获状态，
//! 而是在窗口结束时读取最终状态。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

type Action = Arc<dyn Fn() + Send + Sync>;

/// 可取消的延迟动作，带脏标记
pub struct Debouncer {
    delay_ms: AtomicU64,
    dirty: Arc<AtomicBool>,
    fired: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
    action: Action,
}

impl Debouncer {
    pub fn new<F>(delay: Duration, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            delay_ms: AtomicU64::new(millis(delay)),
            dirty: Arc::new(AtomicBool::new(false)),
            fired: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
            action: Arc::new(action),
        }
    }

    /// 标记为脏并重新开始计时
    ///
    /// 没有 tokio 运行时的时候直接同步执行。
    pub fn trigger(&self) {
        self.dirty.store(true, Ordering::SeqCst);

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.flush();
                return;
            }
        };

        let mut pending = self.lock_pending();
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        let delay = self.delay();
        let dirty = Arc::clone(&self.dirty);
        let fired = Arc::clone(&self.fired);
        let action = Arc::clone(&self.action);
        *pending = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if dirty.swap(false, Ordering::SeqCst) {
                fired.fetch_add(1, Ordering::SeqCst);
                action();
            }
        }));
    }

    /// 取消计时，若有未写入的变更则立即执行
    pub fn flush(&self) {
        if let Some(previous) = self.lock_pending().take() {
            previous.abort();
        }
        if self.dirty.swap(false, Ordering::SeqCst) {
            self.fired.fetch_add(1, Ordering::SeqCst);
            (self.action)();
        }
    }

    /// 取消计时并丢弃脏标记
    pub fn cancel(&self) {
        if let Some(previous) = self.lock_pending().take() {
            previous.abort();
        }
        self.dirty.store(false, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// 动作实际执行的次数
    pub fn fire_count(&self) -> u64 {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::SeqCst))
    }

    /// 修改安静窗口，从下一次触发开始生效
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(millis(delay), Ordering::SeqCst);
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.flush();
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay())
            .field("dirty", &self.is_dirty())
            .field("fired", &self.fire_count())
            .finish()
    }
}
