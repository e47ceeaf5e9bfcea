//! # Host CLI
//!
//! 无界面的演示宿主：加载引擎配置，构造扫描动画，分别通过管理器和连续动画器播放。
//!
//! ## 用法
//!
//! ```bash
//! cargo run -p host-cli -- manager --drivers 3
//! cargo run -p host-cli -- --fps 120 --frames 60 animator --count 8
//! cargo run -p host-cli -- --log-level trace --easing ease-out-bounce manager
//! cargo run -p host-cli -- init engine.json
//! ```

mod demo;
mod easing;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anim_runtime::{
    Animatable, AnimationEvent, AnimationManager, AnimationRef, ContinuousAnimator, EngineConfig,
    ProgressTracker,
};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, level_filters::LevelFilter, warn};

use crate::demo::Sweep;
use crate::easing::EasingFunction;

#[derive(Parser)]
#[command(name = "host-cli")]
#[command(about = "动画调度引擎的命令行演示宿主")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 引擎配置文件（JSON），不存在时使用默认配置
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 覆盖配置中的帧率
    #[arg(long, global = true)]
    fps: Option<u32>,

    /// 每个扫描动画的帧数
    #[arg(long, default_value_t = 30, global = true)]
    frames: u32,

    /// 扫描动画使用的缓动
    #[arg(long, value_enum, default_value_t = EasingFunction::EaseInOut, global = true)]
    easing: EasingFunction,

    /// 日志级别
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,
}

#[derive(Subcommand)]
enum Commands {
    /// 通过动画管理器播放：每个具名驱动器一条通道，通道内顺序阻塞播放
    Manager {
        /// 额外创建的具名驱动器数量
        #[arg(long, default_value_t = 2)]
        drivers: usize,

        /// 每条通道顺序播放的动画数
        #[arg(long, default_value_t = 2)]
        per_lane: usize,
    },

    /// 通过连续动画器播放：一次性提交，收集完成事件
    Animator {
        /// 提交的动画数量
        #[arg(long, default_value_t = 4)]
        count: usize,
    },

    /// 把当前生效的配置写入文件
    Init {
        /// 输出路径
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(cli.log_level))
        .with_thread_names(true)
        .init();

    let config = load_config(&cli)?;
    info!(fps = config.fps, drivers = ?config.drivers, "引擎配置已加载");

    match cli.command.unwrap_or(Commands::Manager {
        drivers: 2,
        per_lane: 2,
    }) {
        Commands::Manager { drivers, per_lane } => {
            run_manager(&config, drivers, per_lane, cli.frames, cli.easing)
        }
        Commands::Animator { count } => run_animator(&config, count, cli.frames, cli.easing),
        Commands::Init { output } => {
            config
                .save(&output)
                .with_context(|| format!("写入配置失败: {}", output.display()))?;
            info!(path = %output.display(), "配置已写入");
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::default(),
    };
    if let Some(fps) = cli.fps {
        config.fps = fps;
    }
    config.validate().context("引擎配置无效")?;
    if config.fps == 0 {
        bail!("帧率为 0 时动画永远不会推进");
    }
    Ok(config)
}

fn run_manager(
    config: &EngineConfig,
    lanes: usize,
    per_lane: usize,
    frames: u32,
    easing: EasingFunction,
) -> Result<()> {
    let manager = AnimationManager::with_config(config)?;
    let names: Vec<String> = (0..lanes).map(|i| format!("lane-{i}")).collect();
    for name in &names {
        if !manager.has_driver(name) {
            manager.create_driver(name)?;
        }
    }
    info!(drivers = ?manager.driver_names(), "驱动器已就绪");

    // 默认驱动器上放一个不等待的动画
    let background = Arc::new(Sweep::new(
        "background",
        frames.saturating_mul(2),
        EasingFunction::Linear,
        ProgressTracker::new(),
    ));
    background.add_listener(Arc::new(|event: &AnimationEvent| {
        info!(kind = ?event.kind(), driver = event.cause().name(), "后台动画结束");
    }));
    manager.add_animation(background.clone(), None)?;

    let share = 1.0 / per_lane.max(1) as f64;
    let lanes: Vec<ProgressTracker> = names.iter().map(|_| ProgressTracker::new()).collect();
    thread::scope(|scope| -> Result<()> {
        let handles: Vec<_> = names
            .iter()
            .zip(&lanes)
            .map(|(name, lane)| {
                let manager = &manager;
                scope.spawn(move || -> Result<()> {
                    for step in 0..per_lane {
                        let sweep = Arc::new(Sweep::new(
                            format!("{name}/{step}"),
                            frames,
                            easing,
                            lane.sub_tracker(step as f64 * share, share),
                        ));
                        let item: AnimationRef = sweep.clone();
                        manager.animate_and_wait(Some(name.as_str()), item)?;
                        info!(
                            sweep = sweep.label(),
                            lane = lane.progress(),
                            value = sweep.value(),
                            "动画完成"
                        );
                    }
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle.join().map_err(|_| anyhow!("播放线程异常退出"))??;
        }
        Ok(())
    })?;

    for (name, lane) in names.iter().zip(&lanes) {
        info!(lane = %name, progress = lane.progress(), "通道完成");
    }
    if background.is_controlled() {
        warn!(frame = background.frame(), "后台动画仍在播放，随管理器一起停止");
    }
    manager.shutdown();
    Ok(())
}

fn run_animator(
    config: &EngineConfig,
    count: usize,
    frames: u32,
    easing: EasingFunction,
) -> Result<()> {
    let animator = ContinuousAnimator::with_config(config)?;
    let (done_tx, done_rx) = crossbeam_channel::unbounded();

    let overall = ProgressTracker::new();
    for i in 0..count {
        let sweep = Arc::new(Sweep::new(
            format!("sweep-{i}"),
            frames.saturating_add(i as u32),
            easing,
            ProgressTracker::new(),
        ));
        let done_tx = done_tx.clone();
        let label = sweep.label().to_string();
        sweep.add_listener(Arc::new(move |event: &AnimationEvent| {
            let _ = done_tx.send((label.clone(), event.kind()));
        }));
        animator.animate(sweep)?;
    }
    drop(done_tx);

    // 最慢的动画也应在这个时限内结束
    let budget = completion_budget(frames, count, config.fps);
    for _ in 0..count {
        let (label, kind) = done_rx
            .recv_timeout(budget)
            .context("等待动画完成超时")?;
        overall.advance_progress(1.0 / count as f64);
        info!(sweep = %label, ?kind, overall = overall.progress(), "动画结束");
    }

    info!(pending = animator.pending_len(), active = animator.driver().len(), "全部完成");
    animator.shutdown();
    Ok(())
}

/// 最长的扫描动画播放完所需的时间，外加 2 秒余量
fn completion_budget(frames: u32, count: usize, fps: u32) -> Duration {
    let longest = u64::from(frames.saturating_add(count as u32));
    Duration::from_millis(longest * 1000 / u64::from(fps.max(1)) + 2000)
}
