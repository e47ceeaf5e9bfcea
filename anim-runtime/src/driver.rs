//! # Driver 模块
//!
//! 帧驱动器：在独立线程上按固定帧率推进一组可动画对象。
//!
//! ## 执行模型
//!
//! ```text
//! loop {
//!     period = round(1000 / fps) ms
//!     等待 period（stop 信号可随时唤醒）
//!     对工作列表快照中仍在列表、尚未完成的条目依次 advance_frame(fps)
//! }
//! ```
//!
//! - 工作列表以插入顺序推进，遍历的是快照，不持锁回调
//! - `fps == 0` 的驱动器从不推进，只按空闲间隔检查帧率与 stop 信号
//! - stop 请求到达时，本轮剩余条目被放弃；正在执行的 `advance_frame` 会执行完
//! - 完成的条目不再被推进，直到被移除
//! - 推进中被移除的条目在 `advance_frame` 返回后才释放控制，之后才能交给其他驱动器

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{debug, trace, warn};

use crate::animatable::{AnimationRef, FrameStatus, ListenerRef, ListenerSet, same_animation};
use crate::error::{AnimError, AnimResult};
use crate::event::AnimationEvent;

/// `fps == 0` 时检查帧率 / stop 信号的默认间隔
pub const DEFAULT_IDLE_POLL: Duration = Duration::from_millis(100);

/// 计算帧间隔：`round(1000 / fps)` 毫秒
///
/// `fps == 0` 返回 `None`（从不推进）。间隔至少 1ms。
pub fn frame_period(fps: u32) -> Option<Duration> {
    if fps == 0 {
        return None;
    }
    let millis = (1000.0 / f64::from(fps)).round() as u64;
    Some(Duration::from_millis(millis.max(1)))
}

const ENTRY_ACTIVE: u8 = 0;
const ENTRY_ADVANCING: u8 = 1;
const ENTRY_FINISHED: u8 = 2;
const ENTRY_REMOVED: u8 = 3;

/// 工作列表条目
struct Entry {
    item: AnimationRef,
    state: AtomicU8,
}

impl Entry {
    fn new(item: AnimationRef) -> Self {
        Self {
            item,
            state: AtomicU8::new(ENTRY_ACTIVE),
        }
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// ACTIVE -> ADVANCING，失败说明已完成或已移除
    fn begin_advance(&self) -> bool {
        self.transition(ENTRY_ACTIVE, ENTRY_ADVANCING)
    }

    /// 推进结束后回到 ACTIVE 或进入 FINISHED
    ///
    /// 返回 `false` 表示推进期间条目已被移除。
    fn end_advance(&self, status: FrameStatus) -> bool {
        let to = if status.is_finished() {
            ENTRY_FINISHED
        } else {
            ENTRY_ACTIVE
        };
        self.transition(ENTRY_ADVANCING, to)
    }

    /// 标记为已移除并在可以时释放控制，返回之前的状态
    ///
    /// 正在推进的条目不在这里释放，由帧循环在 `advance_frame` 返回后释放。
    fn mark_removed(&self) -> u8 {
        let previous = self.state.swap(ENTRY_REMOVED, Ordering::AcqRel);
        if previous != ENTRY_ADVANCING && previous != ENTRY_REMOVED {
            self.item.animatable_state().release();
        }
        previous
    }
}

/// 帧循环线程句柄
struct Worker {
    /// 丢弃即唤醒并终止帧循环
    stop_tx: Sender<()>,
    /// 本次运行的 stop 标记，帧内逐条检查
    stopping: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

struct DriverShared {
    name: String,
    fps: AtomicU32,
    idle_poll: Duration,
    entries: Mutex<Vec<Arc<Entry>>>,
    /// 关闭后拒绝新的动画，写入时持有 entries 锁
    closed: AtomicBool,
    listeners: ListenerSet,
    worker: Mutex<Option<Worker>>,
}

impl DriverShared {
    fn lock_entries(&self) -> MutexGuard<'_, Vec<Arc<Entry>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for DriverShared {
    fn drop(&mut self) {
        // 最后一个句柄消失：stop_tx 随 Worker 一起丢弃，帧循环自行退出。
        // 仍在列表中的动画必须释放，否则无法再提交到其他驱动器。
        let entries = std::mem::take(
            self.entries
                .get_mut()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for entry in entries {
            entry.mark_removed();
        }
    }
}

/// 帧驱动器
///
/// 可克隆的句柄，所有克隆指向同一个驱动器。创建时处于停止状态。
#[derive(Clone)]
pub struct FrameDriver {
    shared: Arc<DriverShared>,
}

impl FrameDriver {
    /// 创建驱动器（停止状态）
    pub fn new(name: impl Into<String>, fps: u32) -> Self {
        Self::with_idle_poll(name, fps, DEFAULT_IDLE_POLL)
    }

    /// 创建驱动器，并指定 `fps == 0` 时的空闲检查间隔
    pub fn with_idle_poll(name: impl Into<String>, fps: u32, idle_poll: Duration) -> Self {
        Self {
            shared: Arc::new(DriverShared {
                name: name.into(),
                fps: AtomicU32::new(fps),
                idle_poll,
                entries: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                listeners: ListenerSet::new(),
                worker: Mutex::new(None),
            }),
        }
    }

    /// 驱动器名称
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// 当前帧率
    pub fn fps(&self) -> u32 {
        self.shared.fps.load(Ordering::Acquire)
    }

    /// 修改帧率
    ///
    /// 从下一次循环迭代起生效，当前正在等待的间隔不受影响。
    pub fn set_fps(&self, fps: u32) {
        self.shared.fps.store(fps, Ordering::Release);
        debug!(driver = %self.name(), fps, "帧率已修改");
    }

    // ========== 工作列表 ==========

    /// 添加动画
    ///
    /// 动画已被控制时返回 [`AnimError::AlreadyControlled`]，不做任何修改；
    /// 驱动器已关闭时返回 [`AnimError::UnknownDriver`]。
    pub fn add(&self, item: AnimationRef) -> AnimResult<()> {
        if !item.animatable_state().try_claim() {
            return Err(AnimError::AlreadyControlled);
        }
        self.attach_claimed(item.clone()).inspect_err(|_| {
            item.animatable_state().release();
        })
    }

    /// 把已认领的动画追加到工作列表
    ///
    /// 驱动器已关闭时不追加，认领仍归调用方处理。
    pub(crate) fn attach_claimed(&self, item: AnimationRef) -> AnimResult<()> {
        let mut entries = self.shared.lock_entries();
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(AnimError::UnknownDriver {
                name: self.name().to_string(),
            });
        }
        entries.push(Arc::new(Entry::new(item)));
        debug!(driver = %self.name(), count = entries.len(), "动画已加入");
        Ok(())
    }

    /// 关闭驱动器：之后的 `add` 都会失败
    ///
    /// 与 `add` 在同一把锁下完成，关闭之后不会再有动画进入工作列表。
    pub(crate) fn close(&self) {
        let _entries = self.shared.lock_entries();
        self.shared.closed.store(true, Ordering::Release);
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// 移除动画
    ///
    /// 不在列表中时什么都不做并返回 `false`。
    /// 动画若尚未完成，会在释放控制之后收到 `Stopped` 事件。
    pub fn remove(&self, item: &AnimationRef) -> bool {
        // 在锁内释放控制：另一个 remove 看到条目不在列表时，控制一定已释放
        let (entry, previous) = {
            let mut entries = self.shared.lock_entries();
            let Some(index) = entries.iter().position(|e| same_animation(&e.item, item)) else {
                return false;
            };
            let entry = entries.remove(index);
            let previous = entry.mark_removed();
            (entry, previous)
        };
        self.after_detach(&entry, previous);
        true
    }

    /// 移除所有动画
    pub fn clear(&self) -> usize {
        let detached: Vec<(Arc<Entry>, u8)> = {
            let mut entries = self.shared.lock_entries();
            entries
                .drain(..)
                .map(|entry| {
                    let previous = entry.mark_removed();
                    (entry, previous)
                })
                .collect()
        };
        for (entry, previous) in &detached {
            self.after_detach(entry, *previous);
        }
        detached.len()
    }

    /// 锁外的收尾：未完成的条目收到 `Stopped`
    ///
    /// 正在推进的条目由帧循环在推进结束后释放并通知。
    fn after_detach(&self, entry: &Entry, previous: u8) {
        debug!(driver = %self.name(), "动画已移除");
        if previous == ENTRY_ACTIVE {
            self.publish(&AnimationEvent::stopped(entry.item.clone(), self.clone()));
        }
    }

    /// 是否包含动画
    pub fn contains(&self, item: &AnimationRef) -> bool {
        self.shared
            .lock_entries()
            .iter()
            .any(|e| same_animation(&e.item, item))
    }

    /// 工作列表长度
    pub fn len(&self) -> usize {
        self.shared.lock_entries().len()
    }

    /// 工作列表是否为空
    pub fn is_empty(&self) -> bool {
        self.shared.lock_entries().is_empty()
    }

    /// 工作列表快照（插入顺序）
    pub fn animations(&self) -> Vec<AnimationRef> {
        self.shared
            .lock_entries()
            .iter()
            .map(|e| e.item.clone())
            .collect()
    }

    // ========== 监听器 ==========

    /// 注册驱动器级监听器
    ///
    /// 驱动器持有的任何动画发布事件时都会通知它。
    pub fn add_listener(&self, listener: ListenerRef) -> bool {
        self.shared.listeners.add(listener)
    }

    /// 注销驱动器级监听器
    pub fn remove_listener(&self, listener: &ListenerRef) -> bool {
        self.shared.listeners.remove(listener)
    }

    /// 先通知动画自身的监听器，再通知驱动器级监听器
    fn publish(&self, event: &AnimationEvent) {
        event.source().animatable_state().listeners().notify(event);
        self.shared.listeners.notify(event);
    }

    // ========== 生命周期 ==========

    /// 启动帧循环，已在运行时什么都不做
    pub fn start(&self) -> AnimResult<()> {
        let mut worker = self.shared.lock_worker();
        if worker.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let stopping = Arc::new(AtomicBool::new(false));
        let weak = Arc::downgrade(&self.shared);
        let flag = stopping.clone();

        let thread = thread::Builder::new()
            .name(format!("anim-driver-{}", self.name()))
            .spawn(move || run_loop(weak, stop_rx, flag))
            .map_err(|e| AnimError::ThreadSpawn {
                message: e.to_string(),
            })?;

        *worker = Some(Worker {
            stop_tx,
            stopping,
            thread,
        });
        debug!(driver = %self.name(), fps = self.fps(), "帧循环已启动");
        Ok(())
    }

    /// 停止帧循环，未运行时什么都不做
    ///
    /// 唤醒正在等待的循环并等待线程退出；在帧循环线程内部调用时只发出信号。
    pub fn stop(&self) {
        let Some(worker) = self.shared.lock_worker().take() else {
            return;
        };

        worker.stopping.store(true, Ordering::Release);
        drop(worker.stop_tx);

        if worker.thread.thread().id() == thread::current().id() {
            debug!(driver = %self.name(), "在帧循环内请求停止");
            return;
        }
        if worker.thread.join().is_err() {
            warn!(driver = %self.name(), "帧循环线程异常退出");
        }
        debug!(driver = %self.name(), "帧循环已停止");
    }

    /// 帧循环是否在运行
    pub fn is_running(&self) -> bool {
        self.shared.lock_worker().is_some()
    }

    /// 在调用线程上同步推进一轮
    ///
    /// 供无头宿主和测试逐帧驱动已停止的驱动器使用。返回被推进的条目数。
    /// 帧循环在运行时什么都不做，返回 0。
    pub fn tick(&self) -> usize {
        if self.is_running() {
            warn!(driver = %self.name(), "帧循环运行中，忽略手动 tick");
            return 0;
        }
        self.tick_round(None)
    }

    fn tick_round(&self, stopping: Option<&AtomicBool>) -> usize {
        let fps = self.fps();
        if fps == 0 {
            return 0;
        }

        let snapshot: Vec<Arc<Entry>> = self.shared.lock_entries().clone();
        let mut advanced = 0;

        for entry in snapshot {
            if stopping.is_some_and(|flag| flag.load(Ordering::Acquire)) {
                trace!(driver = %self.name(), "本轮剩余条目已放弃");
                break;
            }
            if !entry.begin_advance() {
                continue;
            }

            let status =
                match panic::catch_unwind(AssertUnwindSafe(|| entry.item.advance_frame(fps))) {
                    Ok(status) => status,
                    Err(_) => {
                        warn!(driver = %self.name(), "advance_frame panic，按已完成处理");
                        FrameStatus::Finished
                    }
                };
            advanced += 1;

            let event = if entry.end_advance(status) {
                if !status.is_finished() {
                    continue;
                }
                AnimationEvent::finished(entry.item.clone(), self.clone())
            } else {
                // 推进期间被移除：推进结束后才释放控制
                entry.item.animatable_state().release();
                AnimationEvent::stopped(entry.item.clone(), self.clone())
            };
            if panic::catch_unwind(AssertUnwindSafe(|| self.publish(&event))).is_err() {
                warn!(driver = %self.name(), "事件监听器 panic");
            }
        }

        advanced
    }
}

/// 帧循环
///
/// 只持有弱引用：等待期间不延长驱动器的生命周期。
fn run_loop(shared: Weak<DriverShared>, stop_rx: Receiver<()>, stopping: Arc<AtomicBool>) {
    loop {
        let (wait, ticking) = match shared.upgrade() {
            Some(shared) => {
                let fps = shared.fps.load(Ordering::Acquire);
                match frame_period(fps) {
                    Some(period) => (period, true),
                    None => (shared.idle_poll, false),
                }
            }
            None => return,
        };

        match stop_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            // 收到信号或发送端被丢弃：正常退出
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }

        if !ticking || stopping.load(Ordering::Acquire) {
            continue;
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        FrameDriver { shared }.tick_round(Some(&stopping));
    }
}

impl PartialEq for FrameDriver {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for FrameDriver {}

impl std::fmt::Debug for FrameDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDriver")
            .field("name", &self.name())
            .field("fps", &self.fps())
            .field("animations", &self.len())
            .field("running", &self.is_running())
            .finish()
    }
}
