//! Stream EPG Refresh：通过直接读取接收机的流端点触发 EPG 收集，不切换正在观看的频道。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/中断等基础设施
//! - `receiver`：接收机 Web 接口（服务目录、EPG 计数）与 HTTP 流传输
//! - `refresh`：采样时长、判定阈值、单端点采样、端点回退与刷新编排
//! - `ui`：命令行交互（扫描汇总、确认、进度与结果输出）

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use tracing::info;

mod base_system;
mod receiver;
mod refresh;
mod ui;

use base_system::config::load_or_create;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use refresh::duration::SampleDuration;
use ui::noui::{RefreshRequest, RunStatus};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 用户中断时的退出码（128 + SIGINT）。
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Selection {
    /// 按频道列表（bouquet）名称选择服务
    Bouquet,
}

#[derive(Debug, Parser)]
#[command(name = "stream-epg-refresh", version)]
#[command(about = "Stream-based EPG refresh for enigma2 receivers")]
struct Cli {
    /// 接收机 IP 或主机名
    host: String,

    /// 服务选择方式
    #[arg(value_enum)]
    selection: Selection,

    /// 频道列表名称（包含匹配，不区分大小写）
    name: String,

    /// 每个服务的采样时长（秒，0.5-30.0），缺省使用配置文件中的 default_duration
    #[arg(long)]
    duration: Option<SampleDuration>,

    /// 事件数不超过该值的服务视为缺少 EPG
    #[arg(long = "max_events", visible_alias = "max-events", default_value_t = 0)]
    max_events: usize,

    /// 跳过确认提示
    #[arg(long, default_value_t = false)]
    force: bool,

    /// 启用调试日志输出（同时输出到控制台）
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 epg_refresh.yml 和 logs）
    #[arg(long)]
    data_dir: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(RunStatus::Success) => ExitCode::SUCCESS,
        Ok(RunStatus::Failed) => ExitCode::FAILURE,
        Ok(RunStatus::Interrupted) => {
            println!("\n已被用户中断");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(err) => {
            eprintln!("错误: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<RunStatus> {
    let data_dir = cli.data_dir.as_deref().map(Path::new);
    let _log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let config = load_or_create::<Config>(data_dir).map_err(|e| anyhow!(e.to_string()))?;
    let duration = match cli.duration {
        Some(duration) => duration,
        None => SampleDuration::new(config.default_duration)?,
    };

    let request = match cli.selection {
        Selection::Bouquet => RefreshRequest {
            host: cli.host,
            bouquet: cli.name,
            duration,
            max_events: cli.max_events,
            force: cli.force,
        },
    };
    ui::noui::run(&request, &config)
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: debug,
    };
    LogSystem::init(opts, base_dir).map_err(|e| anyhow!(e))
}
