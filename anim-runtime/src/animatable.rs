//! # Animatable 模块
//!
//! 可被驱动器推进的对象接口定义。
//!
//! ## 核心概念
//!
//! - `Animatable`: 可动画对象接口（推进一帧 + 控制状态 + 监听器）
//! - `AnimatableState`: 每个可动画对象内嵌的引擎簿记（控制标记 + 监听器集合）
//! - `AnimationListener`: 完成 / 停止事件的监听器
//! - `ListenerSet`: 按插入顺序分发事件的监听器集合
//!
//! 引擎不计算动画内容（位置、精灵、数值），只负责按时间推进。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::event::AnimationEvent;

/// 单帧推进结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStatus {
    /// 仍在进行
    #[default]
    Running,
    /// 动画自身逻辑判定已完成
    Finished,
}

impl FrameStatus {
    /// 是否已完成
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// 可动画对象接口
///
/// 游戏侧的动画内容实现此 trait，并内嵌一个 [`AnimatableState`]。
///
/// `advance_frame` 返回 [`FrameStatus::Finished`] 即表示动画完成，
/// 持有它的驱动器会在该调用返回之后，以自身作为 cause 发布完成事件。
///
/// ## 实现示例
///
/// ```rust,ignore
/// struct Blink {
///     state: AnimatableState,
///     frames_left: AtomicU32,
/// }
///
/// impl Animatable for Blink {
///     fn advance_frame(&self, _fps: u32) -> FrameStatus {
///         if self.frames_left.fetch_sub(1, Ordering::SeqCst) <= 1 {
///             FrameStatus::Finished
///         } else {
///             FrameStatus::Running
///         }
///     }
///
///     fn animatable_state(&self) -> &AnimatableState {
///         &self.state
///     }
/// }
/// ```
pub trait Animatable: Send + Sync + 'static {
    /// 推进一帧
    ///
    /// # 参数
    /// - `fps`: 驱动器当前帧率，便于按真实时间计算运动
    fn advance_frame(&self, fps: u32) -> FrameStatus;

    /// 引擎簿记
    fn animatable_state(&self) -> &AnimatableState;

    /// 是否已被某个驱动器控制
    fn is_controlled(&self) -> bool {
        self.animatable_state().is_controlled()
    }

    /// 注册监听器（同一个监听器重复注册会被忽略）
    fn add_listener(&self, listener: ListenerRef) {
        self.animatable_state().listeners().add(listener);
    }

    /// 注销监听器
    fn remove_listener(&self, listener: &ListenerRef) -> bool {
        self.animatable_state().listeners().remove(listener)
    }
}

/// 共享的可动画对象引用
pub type AnimationRef = Arc<dyn Animatable>;

/// 判断两个引用是否指向同一个动画实例
pub fn same_animation(a: &AnimationRef, b: &AnimationRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// 可动画对象内嵌的引擎簿记
///
/// `controlled` 的认领 / 释放通过 CAS 完成，两个并发的 `add`
/// 不可能同时认领成功。认领与释放只由驱动器 / 动画器执行。
#[derive(Default)]
pub struct AnimatableState {
    controlled: AtomicBool,
    listeners: ListenerSet,
}

impl AnimatableState {
    /// 创建未被控制的状态
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否已被控制
    pub fn is_controlled(&self) -> bool {
        self.controlled.load(Ordering::Acquire)
    }

    /// 监听器集合
    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    /// 尝试认领，已被控制时返回 `false`
    pub(crate) fn try_claim(&self) -> bool {
        self.controlled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 释放控制
    pub(crate) fn release(&self) {
        self.controlled.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for AnimatableState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatableState")
            .field("controlled", &self.is_controlled())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// 动画事件监听器
///
/// 闭包 `Fn(&AnimationEvent)` 自动实现此 trait。
pub trait AnimationListener: Send + Sync {
    /// 处理事件
    fn on_event(&self, event: &AnimationEvent);
}

impl<F> AnimationListener for F
where
    F: Fn(&AnimationEvent) + Send + Sync,
{
    fn on_event(&self, event: &AnimationEvent) {
        self(event)
    }
}

/// 共享的监听器引用
pub type ListenerRef = Arc<dyn AnimationListener>;

fn same_listener(a: &ListenerRef, b: &ListenerRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// 监听器集合
///
/// 分发前先对列表做快照，监听器在回调中增删监听器不会影响本轮分发，
/// 也不会持锁回调。
#[derive(Default)]
pub struct ListenerSet {
    listeners: Mutex<Vec<ListenerRef>>,
}

impl ListenerSet {
    /// 创建空集合
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ListenerRef>> {
        // 监听器列表本身不会处于半更新状态，毒化后继续使用
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 添加监听器，已存在时返回 `false`
    pub fn add(&self, listener: ListenerRef) -> bool {
        let mut listeners = self.lock();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// 移除监听器，不存在时返回 `false`
    pub fn remove(&self, listener: &ListenerRef) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    /// 是否包含监听器
    pub fn contains(&self, listener: &ListenerRef) -> bool {
        self.lock().iter().any(|l| same_listener(l, listener))
    }

    /// 监听器数量
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 按注册顺序分发事件
    pub fn notify(&self, event: &AnimationEvent) {
        let snapshot: Vec<ListenerRef> = self.lock().clone();
        for listener in snapshot {
            listener.on_event(event);
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}
