//! # Anim Runtime
//!
//! 回合制游戏客户端的动画调度核心库。
//!
//! ## 架构概述
//!
//! `anim-runtime` 只负责按固定帧率推进动画，不计算动画内容、不渲染。
//! 游戏侧对象实现 [`Animatable`]，交给驱动器后在后台线程上被逐帧推进：
//!
//! ```text
//! Game                         Runtime
//!   │                              │
//!   │──── add_animation(item) ───►│ 认领 controlled
//!   │                              │ 帧循环：advance_frame(fps) ...
//!   │◄─── AnimationEvent ─────────│ Finished {source, cause}
//!   │                              │ 自动清理：cause.remove(source)
//! ```
//!
//! ## 核心类型
//!
//! - [`Animatable`]：可动画对象接口
//! - [`FrameDriver`]：固定帧率的后台帧循环
//! - [`AnimationManager`]：具名驱动器注册表 + 自动清理 + 阻塞等待
//! - [`ContinuousAnimator`]：单驱动器 + 待处理队列的简化组合
//! - [`AnimationEvent`]：完成 / 停止事件
//! - [`ProgressTracker`]：嵌套进度追踪
//!
//! ## 使用示例
//!
//! ```ignore
//! use anim_runtime::AnimationManager;
//!
//! let manager = AnimationManager::new(60)?;
//! manager.create_driver("battle")?;
//!
//! // 异步：完成后自动从驱动器移除
//! manager.add_animation(hit_flash, Some("battle"))?;
//!
//! // 同步：播放完再继续
//! manager.animate_and_wait(Some("battle"), unit_move)?;
//! ```
//!
//! ## 模块结构
//!
//! - [`animatable`]：可动画对象接口与监听器
//! - [`event`]：事件定义
//! - [`driver`]：帧驱动器
//! - [`manager`]：动画管理器
//! - [`animator`]：连续动画器
//! - [`wait`]：取消令牌
//! - [`progress`]：进度追踪
//! - [`config`]：引擎配置
//! - [`error`]：错误类型定义

pub mod animatable;
pub mod animator;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod manager;
pub mod progress;
pub mod wait;

// 重导出核心类型
pub use animatable::{
    Animatable, AnimatableState, AnimationListener, AnimationRef, FrameStatus, ListenerRef,
    ListenerSet, same_animation,
};
pub use animator::ContinuousAnimator;
pub use config::{EngineConfig, MAX_FPS};
pub use driver::{DEFAULT_IDLE_POLL, FrameDriver, frame_period};
pub use error::{AnimError, AnimResult, ConfigError};
pub use event::{AnimationEvent, AnimationEventKind};
pub use manager::{AnimationManager, DEFAULT_DRIVER};
pub use progress::ProgressTracker;
pub use wait::CancelToken;
