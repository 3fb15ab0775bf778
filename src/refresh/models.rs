//! 刷新流程的数据模型。
//!
//! 包含候选服务、流端点、单次采样结果、单服务结果与整轮汇总。

use std::time::Duration;

/// 需要刷新 EPG 的服务，由服务目录扫描产生，核心流程只读。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCandidate {
    pub reference: String,
    pub display_name: String,
    pub current_event_count: usize,
}

/// 流端点所在的端口。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPort {
    /// 流服务器端口（默认 8001）
    Stream,
    /// Web 接口端口（默认 80）
    Control,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    /// 以 `/` 开头的路径与查询串，服务引用已转义
    pub path: String,
    pub port: TransportPort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentCategory {
    Video,
    Other,
}

impl ContentCategory {
    /// 按响应声明的 Content-Type 归类：包含 `video` 或 `octet-stream` 视为视频流。
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("video") || ct.contains("octet-stream") {
            Self::Video
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub success: bool,
    pub bytes_received: u64,
    pub chunk_count: u64,
    pub content_category: ContentCategory,
    pub elapsed: Duration,
}

impl ProbeResult {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// 采样成功后 EPG 复查的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// 采样失败，未做复查
    Skipped,
    Counted(usize),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub service: ServiceCandidate,
    pub probe_succeeded: bool,
    pub bytes_received: u64,
    pub event_count_after: usize,
    pub new_events: usize,
    pub verification: Verification,
}

impl RefreshOutcome {
    pub(crate) fn probe_failed(service: ServiceCandidate) -> Self {
        let before = service.current_event_count;
        Self {
            service,
            probe_succeeded: false,
            bytes_received: 0,
            event_count_after: before,
            new_events: 0,
            verification: Verification::Skipped,
        }
    }

    pub(crate) fn verified(
        service: ServiceCandidate,
        probe: &ProbeResult,
        verification: Verification,
    ) -> Self {
        let before = service.current_event_count;
        let after = match verification {
            Verification::Counted(n) => n,
            _ => before,
        };
        Self {
            service,
            probe_succeeded: true,
            bytes_received: probe.bytes_received,
            event_count_after: after,
            new_events: new_events(before, after),
            verification,
        }
    }
}

/// EPG 数量只按增长解释，减少视为 0。
pub fn new_events(before: usize, after: usize) -> usize {
    after.saturating_sub(before)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_services: usize,
    pub successful_probes: usize,
    pub total_new_events: usize,
}

impl RunSummary {
    pub(crate) fn record(&mut self, outcome: &RefreshOutcome) {
        self.total_services += 1;
        if outcome.probe_succeeded {
            self.successful_probes += 1;
        }
        self.total_new_events += outcome.new_events;
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub planned_services: usize,
    pub summary: RunSummary,
    pub outcomes: Vec<RefreshOutcome>,
    pub interrupted: bool,
}

impl RunReport {
    /// 没有需要刷新的服务，或至少一次采样成功。
    pub fn is_success(&self) -> bool {
        self.planned_services == 0 || self.summary.successful_probes > 0
    }
}
