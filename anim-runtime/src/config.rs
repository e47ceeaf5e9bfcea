//! # Config 模块
//!
//! 引擎配置，集中管理帧率与后台循环的间隔。
//!
//! ## 配置优先级
//!
//! 1. 宿主显式覆盖（如命令行参数）
//! 2. 配置文件 (JSON)
//! 3. 默认值

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::manager::DEFAULT_DRIVER;

/// 允许的最大帧率
pub const MAX_FPS: u32 = 1000;

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 帧率，管理器创建的每个驱动器都使用它（0 表示永久暂停）
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// 连续动画器取出待处理队列的间隔（毫秒）
    #[serde(default = "default_pump_interval_ms")]
    pub pump_interval_ms: u64,

    /// `fps == 0` 的驱动器检查帧率变化的间隔（毫秒）
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// 启动时额外创建的具名驱动器（默认驱动器总是存在）
    #[serde(default)]
    pub drivers: Vec<String>,
}

fn default_fps() -> u32 {
    60
}

fn default_pump_interval_ms() -> u64 {
    10
}

fn default_idle_poll_ms() -> u64 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            pump_interval_ms: default_pump_interval_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            drivers: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// 使用指定帧率，其余为默认值
    pub fn with_fps(fps: u32) -> Self {
        Self {
            fps,
            ..Self::default()
        }
    }

    /// 加载配置文件
    ///
    /// 如果文件不存在或解析失败，返回默认配置并记录警告。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            warn!(path = %path.display(), "配置文件不存在，使用默认配置");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match Self::from_json_str(&content) {
                Ok(config) => {
                    info!(path = %path.display(), "配置文件加载成功");
                    config
                }
                Err(e) => {
                    warn!(error = %e, "配置文件解析失败，使用默认配置");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "配置文件读取失败，使用默认配置");
                Self::default()
            }
        }
    }

    /// 从 JSON 文本解析
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(ConfigError::Parse)
    }

    /// 保存配置到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps > MAX_FPS {
            return Err(ConfigError::Invalid(format!(
                "帧率必须在 0 - {MAX_FPS} 之间，实际为 {}",
                self.fps
            )));
        }

        if self.pump_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "pump_interval_ms 必须大于 0".to_string(),
            ));
        }

        if self.idle_poll_ms == 0 {
            return Err(ConfigError::Invalid("idle_poll_ms 必须大于 0".to_string()));
        }

        let mut seen = HashSet::new();
        for name in &self.drivers {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("驱动器名称不能为空".to_string()));
            }
            if name == DEFAULT_DRIVER {
                return Err(ConfigError::Invalid(format!(
                    "驱动器名称 '{DEFAULT_DRIVER}' 为保留名称"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!("驱动器名称重复: {name}")));
            }
        }

        Ok(())
    }

    /// 待处理队列的取出间隔
    pub fn pump_interval(&self) -> Duration {
        Duration::from_millis(self.pump_interval_ms)
    }

    /// 暂停驱动器的空闲检查间隔
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}
