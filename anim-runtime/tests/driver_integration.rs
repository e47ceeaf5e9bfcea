//! # 帧驱动器集成测试
//!
//! 在真实的后台帧循环上验证认领、推进节奏、并发增删与停止行为。

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use anim_runtime::{
    AnimError, Animatable, AnimatableState, AnimationEvent, AnimationRef, FrameDriver,
    FrameStatus, same_animation,
};
use common::{Countdown, RoundProbe, TickClock, wait_until};
use crossbeam_channel::{Receiver, Sender, bounded};

#[test]
fn test_double_add_keeps_first_owner() {
    let first = FrameDriver::new("first", 100);
    let second = FrameDriver::new("second", 100);
    first.start().unwrap();
    second.start().unwrap();

    let item: AnimationRef = Countdown::forever();
    first.add(item.clone()).unwrap();

    assert_eq!(first.add(item.clone()), Err(AnimError::AlreadyControlled));
    assert_eq!(second.add(item.clone()), Err(AnimError::AlreadyControlled));
    assert!(first.contains(&item));
    assert!(second.is_empty());

    first.stop();
    second.stop();
}

#[test]
fn test_tick_interval_follows_fps() {
    let driver = FrameDriver::new("timing", 50);
    let counter = Countdown::forever();
    driver.add(counter.clone()).unwrap();
    driver.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || counter.advanced() >= 12));
    driver.stop();

    assert_eq!(counter.last_fps(), 50);
    let stamps = counter.stamps();
    let span = *stamps.last().unwrap() - stamps[0];
    let average = span / (stamps.len() as u32 - 1);
    // 期望 20ms，留出调度抖动的余量
    assert!(
        average >= Duration::from_millis(15) && average <= Duration::from_millis(60),
        "平均帧间隔 {average:?}"
    );
}

#[test]
fn test_fps_change_is_eventually_observed() {
    let driver = FrameDriver::with_idle_poll("paused", 0, Duration::from_millis(10));
    let counter = Countdown::forever();
    driver.add(counter.clone()).unwrap();
    driver.start().unwrap();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.advanced(), 0);

    driver.set_fps(200);
    assert!(wait_until(Duration::from_secs(2), || counter.advanced() > 0));
    assert_eq!(counter.last_fps(), 200);
    driver.stop();
}

#[test]
fn test_concurrent_add_remove_matches_net_set() {
    let driver = FrameDriver::new("busy", 500);
    let (clock, round) = TickClock::new();
    driver.add(clock).unwrap();
    driver.start().unwrap();

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let driver = driver.clone();
            let round = round.clone();
            thread::spawn(move || {
                let probes: Vec<Arc<RoundProbe>> =
                    (0..16).map(|_| RoundProbe::new(round.clone())).collect();
                let mut present = vec![false; probes.len()];
                for cycle in 0..20 {
                    for (index, probe) in probes.iter().enumerate() {
                        let item: AnimationRef = probe.clone();
                        // 推进中被移除的条目在推进返回前仍处于控制中，add 可能失败
                        if !present[index] && driver.add(item.clone()).is_ok() {
                            present[index] = true;
                        }
                        if present[index] && (index + cycle + worker) % 3 != 0 {
                            assert!(driver.remove(&item));
                            present[index] = false;
                        }
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                let kept: Vec<AnimationRef> = probes
                    .iter()
                    .zip(&present)
                    .filter(|(_, present)| **present)
                    .map(|(probe, _)| -> AnimationRef { probe.clone() })
                    .collect();
                (probes, kept)
            })
        })
        .collect();

    let mut expected: Vec<AnimationRef> = Vec::new();
    let mut all_probes = Vec::new();
    for worker in workers {
        let (probes, kept) = worker.join().unwrap();
        expected.extend(kept);
        all_probes.extend(probes);
    }

    // 再跑几轮，确保并发期间没有同轮重复推进
    let start = round.load(Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(2), || {
        round.load(Ordering::SeqCst) >= start + 3
    }));
    driver.stop();

    let present = driver.animations();
    // 哨兵 + 保留下来的探针
    assert_eq!(present.len(), expected.len() + 1);
    for item in &expected {
        assert!(present.iter().any(|p| same_animation(p, item)));
    }
    let unique: HashSet<usize> = present
        .iter()
        .map(|p| Arc::as_ptr(p) as *const () as usize)
        .collect();
    assert_eq!(unique.len(), present.len());

    for probe in &all_probes {
        assert_eq!(probe.double_advances(), 0);
    }
}

/// 第一次被推进时阻塞，直到测试放行
struct Gate {
    state: AnimatableState,
    entered: Sender<()>,
    release: Receiver<()>,
    blocked_once: AtomicBool,
}

impl Animatable for Gate {
    fn advance_frame(&self, _fps: u32) -> FrameStatus {
        if !self.blocked_once.swap(true, Ordering::SeqCst) {
            let _ = self.entered.send(());
            let _ = self.release.recv();
        }
        FrameStatus::Running
    }

    fn animatable_state(&self) -> &AnimatableState {
        &self.state
    }
}

#[test]
fn test_stop_abandons_rest_of_round() {
    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    let gate = Arc::new(Gate {
        state: AnimatableState::new(),
        entered: entered_tx,
        release: release_rx,
        blocked_once: AtomicBool::new(false),
    });
    let after = Countdown::forever();

    let driver = FrameDriver::new("gated", 100);
    driver.add(gate).unwrap();
    driver.add(after.clone()).unwrap();
    driver.start().unwrap();

    // 帧循环卡在第一个条目里
    entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let stopper = {
        let driver = driver.clone();
        thread::spawn(move || driver.stop())
    };
    assert!(wait_until(Duration::from_secs(2), || !driver.is_running()));

    // stop 已请求，放行正在执行的条目
    release_tx.send(()).unwrap();
    stopper.join().unwrap();

    // 本轮剩余条目被放弃，之后也不再推进
    assert_eq!(after.advanced(), 0);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(after.advanced(), 0);
}

/// 第一次推进时阻塞，并统计重叠的推进调用
struct Slow {
    state: AnimatableState,
    entered: Sender<()>,
    release: Receiver<()>,
    blocked_once: AtomicBool,
    inside: AtomicU32,
    overlaps: AtomicU32,
    advanced: AtomicU32,
}

impl Animatable for Slow {
    fn advance_frame(&self, _fps: u32) -> FrameStatus {
        if self.inside.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.advanced.fetch_add(1, Ordering::SeqCst);
        if !self.blocked_once.swap(true, Ordering::SeqCst) {
            let _ = self.entered.send(());
            let _ = self.release.recv();
        }
        self.inside.fetch_sub(1, Ordering::SeqCst);
        FrameStatus::Running
    }

    fn animatable_state(&self) -> &AnimatableState {
        &self.state
    }
}

#[test]
fn test_remove_mid_advance_keeps_claim_until_advance_returns() {
    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    let slow = Arc::new(Slow {
        state: AnimatableState::new(),
        entered: entered_tx,
        release: release_rx,
        blocked_once: AtomicBool::new(false),
        inside: AtomicU32::new(0),
        overlaps: AtomicU32::new(0),
        advanced: AtomicU32::new(0),
    });
    let item: AnimationRef = slow.clone();

    let stopped = Arc::new(AtomicU32::new(0));
    let sink = stopped.clone();
    item.add_listener(Arc::new(move |event: &AnimationEvent| {
        if !event.is_finished() {
            // 停止事件在推进返回、控制释放之后才发布
            assert!(!event.source().is_controlled());
            sink.fetch_add(1, Ordering::SeqCst);
        }
    }));

    let a = FrameDriver::new("a", 200);
    let b = FrameDriver::new("b", 200);
    a.add(item.clone()).unwrap();
    a.start().unwrap();
    entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    // 推进中被移除：仍处于控制中，其他驱动器无法认领
    assert!(a.remove(&item));
    assert!(!a.contains(&item));
    assert!(item.is_controlled());
    assert_eq!(b.add(item.clone()), Err(AnimError::AlreadyControlled));
    assert_eq!(stopped.load(Ordering::SeqCst), 0);

    release_tx.send(()).unwrap();
    assert!(wait_until(Duration::from_secs(2), || !item.is_controlled()));
    assert_eq!(stopped.load(Ordering::SeqCst), 1);

    b.add(item.clone()).unwrap();
    b.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        slow.advanced.load(Ordering::SeqCst) >= 4
    }));
    a.stop();
    b.stop();

    assert_eq!(slow.overlaps.load(Ordering::SeqCst), 0);
    b.clear();
}

#[test]
fn test_stop_wakes_long_sleep_promptly() {
    let driver = FrameDriver::new("slow", 1);
    driver.start().unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = std::time::Instant::now();
    driver.stop();
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_stop_from_inside_tick() {
    struct StopSelf {
        state: AnimatableState,
        driver: FrameDriver,
    }

    impl Animatable for StopSelf {
        fn advance_frame(&self, _fps: u32) -> FrameStatus {
            self.driver.stop();
            FrameStatus::Running
        }

        fn animatable_state(&self) -> &AnimatableState {
            &self.state
        }
    }

    let driver = FrameDriver::new("self-stop", 200);
    let after = Countdown::forever();
    driver
        .add(Arc::new(StopSelf {
            state: AnimatableState::new(),
            driver: driver.clone(),
        }))
        .unwrap();
    driver.add(after.clone()).unwrap();
    driver.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || !driver.is_running()));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(after.advanced(), 0);

    // 清理：StopSelf 持有驱动器句柄，手动移除打破引用环
    driver.clear();
}
