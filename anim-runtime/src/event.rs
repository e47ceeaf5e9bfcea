//! # Event 模块
//!
//! 完成 / 停止事件定义。
//!
//! 事件携带结束的动画实例（source）和发布事件的驱动器（cause），
//! 处理方据此直接找到应该从哪个驱动器移除该动画，无需全局查找。

use crate::animatable::AnimationRef;
use crate::driver::FrameDriver;

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationEventKind {
    /// 动画自身判定已完成
    Finished,
    /// 动画在完成前被移出驱动器
    Stopped,
}

/// 动画事件（不可变）
#[derive(Clone)]
pub struct AnimationEvent {
    kind: AnimationEventKind,
    source: AnimationRef,
    cause: FrameDriver,
}

impl AnimationEvent {
    /// 创建事件
    pub fn new(kind: AnimationEventKind, source: AnimationRef, cause: FrameDriver) -> Self {
        Self {
            kind,
            source,
            cause,
        }
    }

    /// 完成事件
    pub fn finished(source: AnimationRef, cause: FrameDriver) -> Self {
        Self::new(AnimationEventKind::Finished, source, cause)
    }

    /// 停止事件
    pub fn stopped(source: AnimationRef, cause: FrameDriver) -> Self {
        Self::new(AnimationEventKind::Stopped, source, cause)
    }

    /// 事件类型
    pub fn kind(&self) -> AnimationEventKind {
        self.kind
    }

    /// 结束的动画
    pub fn source(&self) -> &AnimationRef {
        &self.source
    }

    /// 发布事件的驱动器
    pub fn cause(&self) -> &FrameDriver {
        &self.cause
    }

    /// 是否为完成事件
    pub fn is_finished(&self) -> bool {
        self.kind == AnimationEventKind::Finished
    }
}

impl std::fmt::Debug for AnimationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationEvent")
            .field("kind", &self.kind)
            .field("source", &std::sync::Arc::as_ptr(&self.source))
            .field("cause", &self.cause.name())
            .finish()
    }
}
