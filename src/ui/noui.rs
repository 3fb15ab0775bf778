//! 命令行交互：扫描频道列表、确认、逐个服务采样并输出结果。

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{error, info};

use crate::base_system::context::Config;
use crate::base_system::interrupt::{self, CancelToken};
use crate::receiver::ReceiverAddress;
use crate::receiver::client::{DirectoryClient, DirectoryError, DirectoryScan};
use crate::receiver::stream::HttpStreamTransport;
use crate::refresh::duration::SampleDuration;
use crate::refresh::fallback::EndpointFallback;
use crate::refresh::models::{RefreshOutcome, RunReport, Verification};
use crate::refresh::orchestrator::{RefreshEvent, RefreshObserver, RefreshOrchestrator};
use crate::refresh::probe::StreamProbe;

#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub host: String,
    pub bouquet: String,
    pub duration: SampleDuration,
    pub max_events: usize,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failed,
    Interrupted,
}

pub fn run(request: &RefreshRequest, config: &Config) -> Result<RunStatus> {
    println!("{}", "=".repeat(70));
    println!("{}", banner_title(request.duration));
    println!("{}", "=".repeat(70));
    println!("接收机: {}  频道列表: {}", request.host, request.bouquet);
    println!("直接读取流，不切换频道，正在观看的节目不受影响\n");

    let cancel = CancelToken::new();
    interrupt::install_handler(&cancel).context("安装 Ctrl+C 处理失败")?;

    let address = ReceiverAddress::new(&request.host, config.control_port, config.stream_port);
    let directory = DirectoryClient::new(address.clone(), config.request_timeout())
        .context("初始化 Web 接口客户端失败")?;

    println!("查找 '{}' 中缺少 EPG 的服务...", request.bouquet);
    let scan = match directory.scan(&request.bouquet, request.max_events, &cancel) {
        Ok(scan) => scan,
        Err(err) => return Ok(scan_failure(&err)),
    };
    print_scan(&scan);

    if scan.candidates.is_empty() {
        println!("所有服务都已有 EPG 数据，无需刷新");
        return Ok(RunStatus::Success);
    }

    if !request.force && !confirm(scan.candidates.len(), request.duration)? {
        println!("已取消");
        return Ok(RunStatus::Failed);
    }
    // 确认提示期间按下的 Ctrl+C 在这里生效
    if cancel.is_cancelled() {
        return Ok(RunStatus::Interrupted);
    }

    let transport = HttpStreamTransport::new(address, &config.user_agent)
        .context("初始化流客户端失败")?;
    let probe = StreamProbe::new(transport, cancel.clone())
        .with_server_error_backoff(config.server_error_backoff());
    let fallback = EndpointFallback::new(probe, config.secondary_endpoints);

    let bar = make_bar(scan.candidates.len());
    let mut orchestrator = RefreshOrchestrator::new(fallback, &directory, config.pacing(), cancel)
        .with_observer(make_observer(bar.clone()));

    println!();
    let report = orchestrator.run(&scan.candidates, request.duration);
    bar.finish_and_clear();

    print_report(&report);
    Ok(status_of(&report))
}

fn banner_title(duration: SampleDuration) -> String {
    format!("流采样 EPG 刷新 - 每个服务 {}", duration)
}

fn scan_failure(err: &DirectoryError) -> RunStatus {
    if let DirectoryError::Cancelled = err {
        return RunStatus::Interrupted;
    }
    error!("服务目录查询失败: {}", err);
    println!("服务目录查询失败: {}", err);
    RunStatus::Failed
}

fn status_of(report: &RunReport) -> RunStatus {
    if report.interrupted {
        RunStatus::Interrupted
    } else if report.is_success() {
        RunStatus::Success
    } else {
        RunStatus::Failed
    }
}

fn print_scan(scan: &DirectoryScan) {
    println!("\n频道列表 '{}':", scan.bouquet_name);
    println!("  条目总数: {}", scan.total_entries);
    println!("  电视/广播服务: {}", scan.playable);
    println!("  其他（标记/文件夹）: {}", scan.other_entries());
    println!("  已有 EPG: {}", scan.with_epg);
    println!("  需要刷新: {}", scan.candidates.len());
}

/// 预计总耗时：每个服务的采样时长加 0.5 秒间隔。
fn estimated_secs(count: usize, duration: SampleDuration) -> f64 {
    count as f64 * (duration.as_secs_f64() + 0.5)
}

fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "j" | "ja" | "y" | "yes"
    )
}

fn confirm(count: usize, duration: SampleDuration) -> Result<bool> {
    println!("\n  • {} 个服务需要刷新", count);
    println!("  • 每个服务采样 {}", duration);
    println!("  • 预计总耗时约 {:.0}s", estimated_secs(count, duration));
    let answer = read_line("\n开始流采样刷新？(j/N): ")?;
    Ok(is_affirmative(&answer))
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line)
}

fn make_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    bar.set_style(style);
    bar
}

fn make_observer(bar: ProgressBar) -> RefreshObserver {
    Box::new(move |event: RefreshEvent<'_>| match event {
        RefreshEvent::ServiceStarted {
            index,
            total,
            service,
        } => {
            bar.set_message(format!("{}/{} {}", index + 1, total, service.display_name));
        }
        RefreshEvent::ServiceFinished {
            index,
            total,
            outcome,
        } => {
            bar.println(outcome_line(index, total, outcome));
            bar.inc(1);
        }
    })
}

fn outcome_line(index: usize, total: usize, outcome: &RefreshOutcome) -> String {
    let name: String = outcome.service.display_name.chars().take(40).collect();
    let status = if !outcome.probe_succeeded {
        if outcome.bytes_received > 0 {
            format!("失败 ({}KB)", outcome.bytes_received / 1024)
        } else {
            "失败".to_string()
        }
    } else {
        match &outcome.verification {
            Verification::Counted(_) => format!(
                "成功 {}KB, {} 个事件 (+{})",
                outcome.bytes_received / 1024,
                outcome.event_count_after,
                outcome.new_events
            ),
            Verification::Failed(_) => format!(
                "成功 {}KB, EPG 复查失败",
                outcome.bytes_received / 1024
            ),
            Verification::Skipped => format!("成功 {}KB", outcome.bytes_received / 1024),
        }
    };
    format!("[{:>2}/{}] {:<40} {}", index + 1, total, name, status)
}

fn print_report(report: &RunReport) {
    let summary = report.summary;
    if report.interrupted {
        println!(
            "\n已中断：完成 {}/{} 个服务",
            summary.total_services, report.planned_services
        );
    }
    println!(
        "\n结果: {}/{} 采样成功，新增 {} 个 EPG 事件",
        summary.successful_probes, report.planned_services, summary.total_new_events
    );
    info!(
        "summary: total={} successful={} new_events={} interrupted={}",
        summary.total_services, summary.successful_probes, summary.total_new_events, report.interrupted
    );
    if report.is_success() {
        println!("流采样 EPG 刷新成功");
    } else {
        println!("流采样 EPG 刷新失败");
    }
}
