//! 集成测试共用的可动画对象与等待工具。

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anim_runtime::{Animatable, AnimatableState, FrameStatus};

/// 推进 `frames` 帧后完成；`frames == 0` 表示永不完成
pub struct Countdown {
    state: AnimatableState,
    frames: u32,
    advanced: AtomicU32,
    last_fps: AtomicU32,
    stamps: Mutex<Vec<Instant>>,
}

impl Countdown {
    pub fn new(frames: u32) -> Arc<Self> {
        Arc::new(Self {
            state: AnimatableState::new(),
            frames,
            advanced: AtomicU32::new(0),
            last_fps: AtomicU32::new(0),
            stamps: Mutex::new(Vec::new()),
        })
    }

    pub fn forever() -> Arc<Self> {
        Self::new(0)
    }

    pub fn advanced(&self) -> u32 {
        self.advanced.load(Ordering::SeqCst)
    }

    pub fn last_fps(&self) -> u32 {
        self.last_fps.load(Ordering::SeqCst)
    }

    pub fn stamps(&self) -> Vec<Instant> {
        self.stamps.lock().unwrap().clone()
    }
}

impl Animatable for Countdown {
    fn advance_frame(&self, fps: u32) -> FrameStatus {
        self.last_fps.store(fps, Ordering::SeqCst);
        self.stamps.lock().unwrap().push(Instant::now());
        let n = self.advanced.fetch_add(1, Ordering::SeqCst) + 1;
        if self.frames != 0 && n >= self.frames {
            FrameStatus::Finished
        } else {
            FrameStatus::Running
        }
    }

    fn animatable_state(&self) -> &AnimatableState {
        &self.state
    }
}

/// 每轮最先被推进的哨兵，给当前轮次编号
pub struct TickClock {
    state: AnimatableState,
    round: Arc<AtomicU64>,
}

impl TickClock {
    pub fn new() -> (Arc<Self>, Arc<AtomicU64>) {
        let round = Arc::new(AtomicU64::new(0));
        (
            Arc::new(Self {
                state: AnimatableState::new(),
                round: round.clone(),
            }),
            round,
        )
    }
}

impl Animatable for TickClock {
    fn advance_frame(&self, _fps: u32) -> FrameStatus {
        self.round.fetch_add(1, Ordering::SeqCst);
        FrameStatus::Running
    }

    fn animatable_state(&self) -> &AnimatableState {
        &self.state
    }
}

/// 记录每次被推进时的轮次，同一轮被推进两次即计数
pub struct RoundProbe {
    state: AnimatableState,
    round: Arc<AtomicU64>,
    last_round: AtomicU64,
    double_advances: AtomicU32,
}

impl RoundProbe {
    pub fn new(round: Arc<AtomicU64>) -> Arc<Self> {
        Arc::new(Self {
            state: AnimatableState::new(),
            round,
            last_round: AtomicU64::new(0),
            double_advances: AtomicU32::new(0),
        })
    }

    pub fn double_advances(&self) -> u32 {
        self.double_advances.load(Ordering::SeqCst)
    }
}

impl Animatable for RoundProbe {
    fn advance_frame(&self, _fps: u32) -> FrameStatus {
        let round = self.round.load(Ordering::SeqCst);
        if self.last_round.swap(round, Ordering::SeqCst) == round {
            self.double_advances.fetch_add(1, Ordering::SeqCst);
        }
        FrameStatus::Running
    }

    fn animatable_state(&self) -> &AnimatableState {
        &self.state
    }
}

/// 轮询直到条件成立，超时返回 `false`
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
