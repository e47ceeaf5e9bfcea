//! # Error 模块
//!
//! 定义 anim-runtime 中使用的错误类型。
//!
//! 所有权 / 注册表错误代表调用方的时序 bug，立即返回，不做内部重试。
//! 帧循环被 stop 打断属于正常退出，不会以错误形式出现。

use thiserror::Error;

/// 动画引擎错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnimError {
    /// 动画已被某个驱动器控制
    #[error("动画已被其他驱动器控制，必须先移除才能再次提交")]
    AlreadyControlled,

    /// 驱动器不存在
    #[error("驱动器 '{name}' 不存在")]
    UnknownDriver { name: String },

    /// 阻塞等待被取消
    #[error("等待动画完成时被取消")]
    WaitCancelled,

    /// 动画在完成前被移除
    #[error("动画在完成前被移除")]
    AnimationStopped,

    /// 组件未运行，无法完成请求
    #[error("{component} 未运行")]
    NotRunning { component: &'static str },

    /// 后台线程创建失败
    #[error("后台线程创建失败: {message}")]
    ThreadSpawn { message: String },
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO 错误
    #[error("配置 IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析失败
    #[error("配置解析失败: {0}")]
    Parse(#[source] serde_json::Error),

    /// 序列化失败
    #[error("配置序列化失败: {0}")]
    Serialize(#[source] serde_json::Error),

    /// 验证失败
    #[error("配置验证失败: {0}")]
    Invalid(String),
}

/// Result 类型别名
pub type AnimResult<T> = Result<T, AnimError>;
