//! 运行期共享统计
//! 所有工作线程并发更新，不加锁

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 整个运行期间共享的最大值
#[derive(Debug, Default)]
pub struct RunStats {
    max_batch_millis: AtomicU64,
    max_get_micros: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新最大批次耗时，返回更新后的最大值
    #[inline]
    pub fn observe_batch(&self, millis: u64) -> u64 {
        update_max(&self.max_batch_millis, millis)
    }

    /// 更新单次读的最大耗时
    #[inline]
    pub fn observe_get(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.max_get_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn max_batch_millis(&self) -> u64 {
        self.max_batch_millis.load(Ordering::Relaxed)
    }

    pub fn max_get_latency(&self) -> Duration {
        Duration::from_micros(self.max_get_micros.load(Ordering::Relaxed))
    }

    /// 预热结束后清零
    pub fn reset_max_batch(&self) {
        self.max_batch_millis.store(0, Ordering::Relaxed);
    }
}

/// CAS 循环求最大值，返回写入后（或已存在的更大）值
pub fn update_max(cell: &AtomicU64, value: u64) -> u64 {
    let mut current = cell.load(Ordering::Relaxed);
    while value > current {
        match cell.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return value,
            Err(actual) => current = actual,
        }
    }
    current
}
