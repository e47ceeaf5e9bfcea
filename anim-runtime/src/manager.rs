//! # Manager 模块
//!
//! 动画管理器：具名帧驱动器的注册表 + 完成后的自动清理。
//!
//! ## 数据流
//!
//! ```text
//! add_animation(item, name)
//!   └─► driver.add(item)            认领 controlled，加入工作列表
//!         └─► 帧循环 advance_frame   ...直到 Finished
//!               └─► 完成事件 {source: item, cause: driver}
//!                     └─► 自动清理：cause.remove(source)   释放 controlled
//! ```
//!
//! 管理器独占它创建的所有驱动器，销毁管理器会停止并释放全部驱动器。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info};

use crate::animatable::{AnimationRef, ListenerRef};
use crate::config::EngineConfig;
use crate::driver::FrameDriver;
use crate::error::{AnimError, AnimResult};
use crate::event::AnimationEvent;
use crate::wait::{CancelToken, CompletionWatch, wait_for};

/// 保留的默认驱动器名称
pub const DEFAULT_DRIVER: &str = "default";

/// 自动清理：完成的动画从发布事件的驱动器移除
fn auto_remove(event: &AnimationEvent) {
    if event.is_finished() {
        event.cause().remove(event.source());
    }
}

/// 动画管理器
pub struct AnimationManager {
    fps: u32,
    idle_poll: Duration,
    drivers: Mutex<HashMap<String, FrameDriver>>,
    /// 挂在每个自建驱动器上的自动清理监听器
    cleanup: ListenerRef,
}

impl AnimationManager {
    /// 创建管理器，并启动默认驱动器
    pub fn new(fps: u32) -> AnimResult<Self> {
        Self::with_config(&EngineConfig::with_fps(fps))
    }

    /// 按配置创建管理器
    ///
    /// 除默认驱动器外，还会创建 `config.drivers` 中列出的驱动器。
    /// 配置应事先通过 [`EngineConfig::validate`] 检查。
    pub fn with_config(config: &EngineConfig) -> AnimResult<Self> {
        let manager = Self {
            fps: config.fps,
            idle_poll: config.idle_poll(),
            drivers: Mutex::new(HashMap::new()),
            cleanup: Arc::new(auto_remove),
        };

        manager.create_driver(DEFAULT_DRIVER)?;
        for name in &config.drivers {
            manager.create_driver(name)?;
        }

        info!(fps = manager.fps, drivers = manager.len(), "动画管理器已创建");
        Ok(manager)
    }

    fn lock_drivers(&self) -> MutexGuard<'_, HashMap<String, FrameDriver>> {
        self.drivers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 管理器帧率
    pub fn fps(&self) -> u32 {
        self.fps
    }

    // ========== 驱动器注册表 ==========

    /// 创建并启动驱动器
    ///
    /// 同名驱动器已存在时，先销毁旧的（停止、摘除清理监听器、释放全部动画），
    /// 新驱动器的工作列表总是空的。
    pub fn create_driver(&self, name: &str) -> AnimResult<FrameDriver> {
        let driver = FrameDriver::with_idle_poll(name, self.fps, self.idle_poll);
        driver.add_listener(self.cleanup.clone());
        driver.start()?;

        let replaced = self.lock_drivers().insert(name.to_string(), driver.clone());
        if let Some(old) = replaced {
            debug!(driver = name, "替换同名驱动器");
            self.retire(&old);
        }

        debug!(driver = name, fps = self.fps, "驱动器已创建");
        Ok(driver)
    }

    /// 销毁驱动器
    ///
    /// 名称不存在时返回 [`AnimError::UnknownDriver`]。
    /// 销毁默认驱动器会以一个新的空驱动器替换它，默认驱动器始终存在。
    pub fn destroy_driver(&self, name: &str) -> AnimResult<()> {
        if name == DEFAULT_DRIVER {
            self.create_driver(DEFAULT_DRIVER)?;
            return Ok(());
        }

        let removed = self.lock_drivers().remove(name);
        match removed {
            Some(driver) => {
                self.retire(&driver);
                debug!(driver = name, "驱动器已销毁");
                Ok(())
            }
            None => Err(AnimError::UnknownDriver {
                name: name.to_string(),
            }),
        }
    }

    /// 关闭并停止驱动器、摘除清理监听器并释放所有动画
    ///
    /// 先关闭：仍持有旧句柄的并发 `add` 会得到 `UnknownDriver`，而不是加入一个死驱动器。
    fn retire(&self, driver: &FrameDriver) {
        driver.close();
        driver.stop();
        driver.remove_listener(&self.cleanup);
        let released = driver.clear();
        if released > 0 {
            debug!(driver = %driver.name(), released, "驱动器上的动画已释放");
        }
    }

    /// 按名称查找驱动器
    pub fn driver(&self, name: &str) -> AnimResult<FrameDriver> {
        self.lock_drivers()
            .get(name)
            .cloned()
            .ok_or_else(|| AnimError::UnknownDriver {
                name: name.to_string(),
            })
    }

    /// 默认驱动器
    pub fn default_driver(&self) -> AnimResult<FrameDriver> {
        self.driver(DEFAULT_DRIVER)
    }

    /// 是否存在驱动器
    pub fn has_driver(&self, name: &str) -> bool {
        self.lock_drivers().contains_key(name)
    }

    /// 所有驱动器名称（已排序）
    pub fn driver_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_drivers().keys().cloned().collect();
        names.sort();
        names
    }

    /// 驱动器数量
    pub fn len(&self) -> usize {
        self.lock_drivers().len()
    }

    /// 是否没有任何驱动器（仅在 `shutdown` 之后成立）
    pub fn is_empty(&self) -> bool {
        self.lock_drivers().is_empty()
    }

    fn resolve(&self, name: Option<&str>) -> AnimResult<FrameDriver> {
        self.driver(name.unwrap_or(DEFAULT_DRIVER))
    }

    // ========== 动画 ==========

    /// 把动画交给指定驱动器（`None` 为默认驱动器）
    pub fn add_animation(&self, item: AnimationRef, driver: Option<&str>) -> AnimResult<()> {
        self.resolve(driver)?.add(item)
    }

    /// 从指定驱动器移除动画，返回动画是否在该驱动器中
    pub fn remove_animation(&self, item: &AnimationRef, driver: Option<&str>) -> AnimResult<bool> {
        Ok(self.resolve(driver)?.remove(item))
    }

    /// 播放动画并阻塞直到它完成
    ///
    /// 返回时动画已从驱动器自动移除，`is_controlled()` 为 `false`。
    pub fn animate_and_wait(&self, driver: Option<&str>, item: AnimationRef) -> AnimResult<()> {
        self.animate_and_wait_with(driver, item, &CancelToken::new())
    }

    /// 播放动画并阻塞直到它完成或 `cancel` 被取消
    ///
    /// # 返回
    /// - `Ok(())`: 动画完成且已移除
    /// - `Err(WaitCancelled)`: 等待被取消，动画继续由驱动器推进
    /// - `Err(AnimationStopped)`: 动画在完成前被移除
    /// - 提交阶段的错误（`UnknownDriver` / `AlreadyControlled` / `NotRunning`），
    ///   查找之后驱动器被并发销毁或替换时同样返回 `UnknownDriver`
    pub fn animate_and_wait_with(
        &self,
        driver: Option<&str>,
        item: AnimationRef,
        cancel: &CancelToken,
    ) -> AnimResult<()> {
        let driver = self.resolve(driver)?;
        if !driver.is_running() {
            return Err(AnimError::NotRunning {
                component: "FrameDriver",
            });
        }

        let (watch, outcome) = CompletionWatch::new(item.clone());
        let watch: ListenerRef = watch;
        driver.add_listener(watch.clone());

        if let Err(e) = driver.add(item) {
            driver.remove_listener(&watch);
            return Err(e);
        }

        let result = wait_for(&outcome, cancel);
        driver.remove_listener(&watch);
        result
    }

    // ========== 生命周期 ==========

    /// 停止并释放所有驱动器
    pub fn shutdown(&self) {
        let drivers: Vec<FrameDriver> = self.lock_drivers().drain().map(|(_, d)| d).collect();
        if drivers.is_empty() {
            return;
        }
        for driver in &drivers {
            self.retire(driver);
        }
        info!(drivers = drivers.len(), "动画管理器已关闭");
    }
}

impl Drop for AnimationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AnimationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationManager")
            .field("fps", &self.fps)
            .field("drivers", &self.driver_names())
            .finish()
    }
}
