//! # Animator 模块
//!
//! 连续动画器：单驱动器的简化组合。
//!
//! ```text
//! animate(item) ──► 待处理队列 (FIFO) ──► 泵线程（每 pump_interval 取空队列）
//!                                           └─► driver.attach + 挂上动画器监听器
//! 完成事件 ──► 动画器监听器：摘除自身 + driver.remove(item)
//! ```
//!
//! 与 [`AnimationManager`](crate::AnimationManager) 契约相同，但只有一个驱动器，
//! 没有具名注册表。提交时即认领 `controlled`，排队期间同样不能重复提交。

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use tracing::{debug, warn};

use crate::animatable::{AnimationListener, AnimationRef, ListenerRef};
use crate::config::EngineConfig;
use crate::driver::FrameDriver;
use crate::error::{AnimError, AnimResult};
use crate::event::AnimationEvent;
use crate::wait::{CancelToken, CompletionWatch, wait_for};

/// 挂在每个动画上的动画器监听器
struct PumpListener {
    animator: Weak<AnimatorShared>,
}

impl AnimationListener for PumpListener {
    fn on_event(&self, event: &AnimationEvent) {
        let Some(shared) = self.animator.upgrade() else {
            return;
        };
        event.source().remove_listener(&shared.listener);
        if event.is_finished() {
            event.cause().remove(event.source());
        }
    }
}

struct Pump {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

struct AnimatorShared {
    driver: FrameDriver,
    pending_tx: Sender<AnimationRef>,
    pending_rx: Receiver<AnimationRef>,
    pump_interval: Duration,
    pump: Mutex<Option<Pump>>,
    listener: ListenerRef,
}

impl AnimatorShared {
    fn lock_pump(&self) -> MutexGuard<'_, Option<Pump>> {
        self.pump
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 把当前所有待处理动画交给驱动器
    fn drain_pending(&self) -> usize {
        let mut handed = 0;
        for item in self.pending_rx.try_iter() {
            item.add_listener(self.listener.clone());
            if let Err(e) = self.driver.attach_claimed(item.clone()) {
                warn!(error = %e, "驱动器拒绝了待处理动画");
                item.remove_listener(&self.listener);
                self.release_one(item);
                continue;
            }
            handed += 1;
        }
        handed
    }

    /// 释放仍在排队的动画，并通知它们已停止
    fn release_pending(&self) -> usize {
        let mut released = 0;
        for item in self.pending_rx.try_iter() {
            self.release_one(item);
            released += 1;
        }
        released
    }

    fn release_one(&self, item: AnimationRef) {
        item.animatable_state().release();
        let event = AnimationEvent::stopped(item.clone(), self.driver.clone());
        item.animatable_state().listeners().notify(&event);
    }
}

/// 连续动画器
pub struct ContinuousAnimator {
    shared: Arc<AnimatorShared>,
}

impl ContinuousAnimator {
    /// 创建并启动动画器
    pub fn new(fps: u32) -> AnimResult<Self> {
        Self::with_config(&EngineConfig::with_fps(fps))
    }

    /// 按配置创建并启动动画器
    pub fn with_config(config: &EngineConfig) -> AnimResult<Self> {
        let (pending_tx, pending_rx) = unbounded();
        let shared = Arc::new_cyclic(|weak: &Weak<AnimatorShared>| AnimatorShared {
            driver: FrameDriver::with_idle_poll("animator", config.fps, config.idle_poll()),
            pending_tx,
            pending_rx,
            pump_interval: config.pump_interval(),
            pump: Mutex::new(None),
            listener: Arc::new(PumpListener {
                animator: weak.clone(),
            }),
        });

        let animator = Self { shared };
        animator.start()?;
        Ok(animator)
    }

    /// 底层驱动器
    pub fn driver(&self) -> &FrameDriver {
        &self.shared.driver
    }

    /// 排队中尚未交给驱动器的动画数量
    pub fn pending_len(&self) -> usize {
        self.shared.pending_rx.len()
    }

    /// 提交动画
    ///
    /// 立即认领；已被控制时返回 [`AnimError::AlreadyControlled`]。
    pub fn animate(&self, item: AnimationRef) -> AnimResult<()> {
        if !item.animatable_state().try_claim() {
            return Err(AnimError::AlreadyControlled);
        }
        // 发送端和接收端都由自身持有，通道不会断开
        if let Err(rejected) = self.shared.pending_tx.send(item) {
            rejected.0.animatable_state().release();
            return Err(AnimError::NotRunning {
                component: "ContinuousAnimator",
            });
        }
        Ok(())
    }

    /// 播放动画并阻塞直到它完成
    pub fn animate_and_wait(&self, item: AnimationRef) -> AnimResult<()> {
        self.animate_and_wait_with(item, &CancelToken::new())
    }

    /// 播放动画并阻塞直到它完成或 `cancel` 被取消
    ///
    /// 返回值含义与 [`AnimationManager::animate_and_wait_with`](crate::AnimationManager::animate_and_wait_with) 相同。
    pub fn animate_and_wait_with(&self, item: AnimationRef, cancel: &CancelToken) -> AnimResult<()> {
        if !self.is_running() {
            return Err(AnimError::NotRunning {
                component: "ContinuousAnimator",
            });
        }

        let (watch, outcome) = CompletionWatch::new(item.clone());
        let watch: ListenerRef = watch;
        item.add_listener(watch.clone());

        if let Err(e) = self.animate(item.clone()) {
            item.remove_listener(&watch);
            return Err(e);
        }

        let result = wait_for(&outcome, cancel);
        item.remove_listener(&watch);
        result
    }

    // ========== 生命周期 ==========

    /// 启动驱动器和泵线程，已在运行时什么都不做
    pub fn start(&self) -> AnimResult<()> {
        self.shared.driver.start()?;

        let mut pump = self.shared.lock_pump();
        if pump.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let weak = Arc::downgrade(&self.shared);
        let interval = self.shared.pump_interval;
        let thread = thread::Builder::new()
            .name("anim-pump".to_string())
            .spawn(move || run_pump(weak, stop_rx, interval))
            .map_err(|e| AnimError::ThreadSpawn {
                message: e.to_string(),
            })?;

        *pump = Some(Pump { stop_tx, thread });
        debug!(fps = self.shared.driver.fps(), "连续动画器已启动");
        Ok(())
    }

    /// 停止泵线程和驱动器，动画保持原状，可再次 `start`
    pub fn stop(&self) {
        let pump = self.shared.lock_pump().take();
        if let Some(pump) = pump {
            drop(pump.stop_tx);
            if pump.thread.join().is_err() {
                warn!("泵线程异常退出");
            }
        }
        self.shared.driver.stop();
        debug!("连续动画器已停止");
    }

    /// 泵线程和驱动器是否都在运行
    pub fn is_running(&self) -> bool {
        self.shared.lock_pump().is_some() && self.shared.driver.is_running()
    }

    /// 停止并释放所有动画（排队中和驱动中的）
    pub fn shutdown(&self) {
        self.stop();
        let pending = self.shared.release_pending();
        let active = self.shared.driver.clear();
        if pending + active > 0 {
            debug!(pending, active, "连续动画器上的动画已释放");
        }
    }
}

fn run_pump(shared: Weak<AnimatorShared>, stop_rx: Receiver<()>, interval: Duration) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        shared.drain_pending();
    }
}

impl Drop for ContinuousAnimator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ContinuousAnimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuousAnimator")
            .field("driver", &self.shared.driver)
            .field("pending", &self.pending_len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animatable::{Animatable, AnimatableState, FrameStatus};

    struct Idle {
        state: AnimatableState,
    }

    impl Animatable for Idle {
        fn advance_frame(&self, _fps: u32) -> FrameStatus {
            FrameStatus::Running
        }

        fn animatable_state(&self) -> &AnimatableState {
            &self.state
        }
    }

    fn idle() -> AnimationRef {
        Arc::new(Idle {
            state: AnimatableState::new(),
        })
    }

    #[test]
    fn test_animate_claims_immediately() {
        let animator = ContinuousAnimator::new(0).unwrap();
        animator.stop();

        let item = idle();
        animator.animate(item.clone()).unwrap();
        assert!(item.is_controlled());
        assert_eq!(animator.pending_len(), 1);

        // 排队期间不能重复提交
        assert_eq!(
            animator.animate(item.clone()),
            Err(AnimError::AlreadyControlled)
        );
    }

    #[test]
    fn test_pump_hands_items_to_driver() {
        let animator = ContinuousAnimator::new(0).unwrap();
        let item = idle();
        animator.animate(item.clone()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !animator.driver().contains(&item) {
            assert!(std::time::Instant::now() < deadline, "泵线程未取出动画");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(animator.pending_len(), 0);
        assert!(item.is_controlled());
    }

    #[test]
    fn test_shutdown_releases_pending_and_active() {
        let animator = ContinuousAnimator::new(0).unwrap();
        animator.stop();

        let queued = idle();
        animator.animate(queued.clone()).unwrap();
        let active = idle();
        animator.driver().add(active.clone()).unwrap();

        animator.shutdown();
        assert!(!queued.is_controlled());
        assert!(!active.is_controlled());
        assert_eq!(animator.pending_len(), 0);
        assert!(animator.driver().is_empty());
    }

    #[test]
    fn test_wait_requires_running() {
        let animator = ContinuousAnimator::new(60).unwrap();
        animator.stop();
        assert!(!animator.is_running());

        assert_eq!(
            animator.animate_and_wait(idle()),
            Err(AnimError::NotRunning {
                component: "ContinuousAnimator"
            })
        );
    }
}
