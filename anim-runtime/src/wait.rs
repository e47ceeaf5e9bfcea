//! # Wait 模块
//!
//! 在异步的完成事件之上构建同步的「播放并等待」。
//!
//! - `CancelToken`: 调用方持有的取消令牌，`cancel()` 立即唤醒所有等待者
//! - `CompletionWatch`: 只关注某一个动画实例的一次性监听器
//!
//! 等待使用 `crossbeam_channel::select!` 同时等待完成信号和取消信号，不轮询。

use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender, bounded, select};
use tracing::debug;

use crate::animatable::{AnimationListener, AnimationRef, same_animation};
use crate::error::{AnimError, AnimResult};
use crate::event::{AnimationEvent, AnimationEventKind};

/// 取消令牌
///
/// 克隆共享同一个取消状态。令牌内部的发送端永远不发送消息，
/// `cancel()` 丢弃它，使所有接收端立即断开。
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    /// 创建未取消的令牌
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Sender<()>>> {
        self.inner
            .trigger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 取消，重复调用无副作用
    pub fn cancel(&self) {
        if self.lock().take().is_some() {
            debug!("等待已取消");
        }
    }

    /// 是否已取消
    pub fn is_cancelled(&self) -> bool {
        self.lock().is_none()
    }

    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// 等待结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Finished,
    Stopped,
}

/// 一次性完成监听器
///
/// 只响应 `target` 实例的事件。完成时先把动画从发布事件的驱动器移除
/// （已移除则是 no-op），再发出信号，因此等待方返回时动画一定已释放控制。
pub(crate) struct CompletionWatch {
    target: AnimationRef,
    done: Sender<WaitOutcome>,
}

impl CompletionWatch {
    pub(crate) fn new(target: AnimationRef) -> (Arc<Self>, Receiver<WaitOutcome>) {
        let (done, outcome) = bounded(1);
        (Arc::new(Self { target, done }), outcome)
    }
}

impl AnimationListener for CompletionWatch {
    fn on_event(&self, event: &AnimationEvent) {
        if !same_animation(event.source(), &self.target) {
            return;
        }
        let outcome = match event.kind() {
            AnimationEventKind::Finished => {
                event.cause().remove(event.source());
                WaitOutcome::Finished
            }
            AnimationEventKind::Stopped => WaitOutcome::Stopped,
        };
        // 只有第一个结果有意义，通道已满时忽略
        let _ = self.done.try_send(outcome);
    }
}

/// 阻塞直到动画结束或令牌被取消
pub(crate) fn wait_for(outcome: &Receiver<WaitOutcome>, cancel: &CancelToken) -> AnimResult<()> {
    if cancel.is_cancelled() {
        return Err(AnimError::WaitCancelled);
    }
    select! {
        recv(outcome) -> result => match result {
            Ok(WaitOutcome::Finished) => Ok(()),
            Ok(WaitOutcome::Stopped) | Err(_) => Err(AnimError::AnimationStopped),
        },
        recv(cancel.signal()) -> _ => Err(AnimError::WaitCancelled),
    }
}
