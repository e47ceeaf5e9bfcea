//! # Demo 模块
//!
//! 演示用的可动画对象：按帧数把一个进度从 0 推到 1，并套用缓动。

use std::sync::atomic::{AtomicU32, Ordering};

use anim_runtime::{Animatable, AnimatableState, FrameStatus, ProgressTracker};
use tracing::trace;

use crate::easing::EasingFunction;

/// 固定帧数的扫描动画
pub struct Sweep {
    state: AnimatableState,
    label: String,
    frames: u32,
    easing: EasingFunction,
    frame: AtomicU32,
    tracker: ProgressTracker,
}

impl Sweep {
    /// `frames` 帧后完成，`frames == 0` 时第一帧即完成
    pub fn new(
        label: impl Into<String>,
        frames: u32,
        easing: EasingFunction,
        tracker: ProgressTracker,
    ) -> Self {
        Self {
            state: AnimatableState::new(),
            label: label.into(),
            frames,
            easing,
            frame: AtomicU32::new(0),
            tracker,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// 已推进的帧数
    pub fn frame(&self) -> u32 {
        self.frame.load(Ordering::SeqCst)
    }

    /// 缓动后的当前值
    pub fn value(&self) -> f64 {
        self.easing.apply(self.tracker.progress())
    }
}

impl Animatable for Sweep {
    fn advance_frame(&self, fps: u32) -> FrameStatus {
        let frame = self.frame.fetch_add(1, Ordering::SeqCst) + 1;
        self.tracker
            .set_progress(f64::from(frame) / f64::from(self.frames.max(1)));

        trace!(label = %self.label, frame, fps, value = self.value(), "sweep");

        if self.tracker.is_complete() {
            FrameStatus::Finished
        } else {
            FrameStatus::Running
        }
    }

    fn animatable_state(&self) -> &AnimatableState {
        &self.state
    }
}

impl std::fmt::Debug for Sweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweep")
            .field("label", &self.label)
            .field("frame", &self.frame())
            .field("frames", &self.frames)
            .field("easing", &self.easing)
            .finish()
    }
}
