//! # Progress 模块
//!
//! 进度追踪：记录 0..1 的完成比例，并支持切出按比例映射到父进度的子进度。
//!
//! 子进度 `[0, 1]` 线性映射到父进度的 `[start, end]`。子进度到达 1.0 时，
//! 父进度被精确设置为 `end`，不会因浮点误差越界或停在 `end` 附近。

use std::sync::{Arc, Mutex, MutexGuard};

/// 进度追踪器
///
/// 可克隆的共享句柄，可以在帧循环线程中更新、在其他线程读取。
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    progress: Mutex<f64>,
    parent: Option<ParentRange>,
}

/// 子进度在父进度上占据的区间
struct ParentRange {
    parent: ProgressTracker,
    start: f64,
    end: f64,
}

impl ParentRange {
    fn map(&self, progress: f64) -> f64 {
        if progress >= 1.0 {
            self.end
        } else {
            self.start + progress * (self.end - self.start)
        }
    }
}

/// 限制在 [0, 1]，NaN 视为 0
fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl ProgressTracker {
    /// 创建根进度（0.0）
    pub fn new() -> Self {
        Self::build(None)
    }

    fn build(parent: Option<ParentRange>) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                progress: Mutex::new(0.0),
                parent,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, f64> {
        self.inner
            .progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 当前进度
    pub fn progress(&self) -> f64 {
        *self.lock()
    }

    /// 是否已完成
    pub fn is_complete(&self) -> bool {
        self.progress() >= 1.0
    }

    /// 设置进度（限制在 0..1），子进度会同步推送到父进度
    pub fn set_progress(&self, progress: f64) {
        self.update(|_| progress);
    }

    /// 前进 `delta`，饱和于 1.0，不会低于 0.0
    pub fn advance_progress(&self, delta: f64) {
        self.update(|current| current + delta);
    }

    /// 重置为 0
    pub fn reset(&self) {
        self.set_progress(0.0);
    }

    fn update(&self, f: impl FnOnce(f64) -> f64) {
        let value = {
            let mut progress = self.lock();
            *progress = clamp_unit(f(*progress));
            *progress
        };
        // 先释放自身的锁再更新父进度
        if let Some(range) = &self.inner.parent {
            range.parent.set_progress(range.map(value));
        }
    }

    /// 切出子进度
    ///
    /// 子进度的 `[0, 1]` 映射到本进度的 `[start, start + len]`，区间会被限制在 `[0, 1]` 内。
    pub fn sub_tracker(&self, start: f64, len: f64) -> ProgressTracker {
        let start = clamp_unit(start);
        let end = clamp_unit(start + len.max(0.0)).max(start);
        Self::build(Some(ParentRange {
            parent: self.clone(),
            start,
            end,
        }))
    }

    /// 子进度在父进度上的区间，根进度返回 `None`
    pub fn range(&self) -> Option<(f64, f64)> {
        self.inner.parent.as_ref().map(|r| (r.start, r.end))
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("progress", &self.progress())
            .field("range", &self.range())
            .finish()
    }
}
