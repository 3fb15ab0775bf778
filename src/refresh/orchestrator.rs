//! 刷新主流程编排。
//!
//! 每个服务依次经历 `Pending → Probing → (Succeeded | Failed) → Verifying → Done`；
//! 采样失败直接结束，不会触发 EPG 复查。服务之间严格串行。

use std::fmt::Display;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::duration::SampleDuration;
use super::fallback::{ServiceProbe, ServiceProber};
use super::models::{ProbeResult, RefreshOutcome, RunReport, ServiceCandidate, Verification};
use crate::base_system::interrupt::{CancelToken, Cancelled};

/// 采样成功后复查服务当前 EPG 事件数。
pub trait EpgSource {
    type Error: Display;

    fn event_count(&self, reference: &str) -> Result<usize, Self::Error>;
}

impl<T: EpgSource + ?Sized> EpgSource for &T {
    type Error = T::Error;

    fn event_count(&self, reference: &str) -> Result<usize, Self::Error> {
        (**self).event_count(reference)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// 采样成功后、复查 EPG 前的等待，让接收机处理刚打开的流
    pub settle: Duration,
    /// 相邻两个服务之间的间隔
    pub between_services: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            between_services: Duration::from_millis(200),
        }
    }
}

pub enum RefreshEvent<'a> {
    ServiceStarted {
        index: usize,
        total: usize,
        service: &'a ServiceCandidate,
    },
    ServiceFinished {
        index: usize,
        total: usize,
        outcome: &'a RefreshOutcome,
    },
}

pub type RefreshObserver = Box<dyn FnMut(RefreshEvent<'_>)>;

#[derive(Debug)]
enum ServiceState {
    Pending(ServiceCandidate),
    Probing(ServiceCandidate),
    Succeeded(ServiceCandidate, ProbeResult),
    Failed(ServiceCandidate, u64),
    Verifying(ServiceCandidate, ProbeResult),
    Done(RefreshOutcome),
}

pub struct RefreshOrchestrator<P, E> {
    prober: P,
    epg: E,
    pacing: Pacing,
    cancel: CancelToken,
    observer: Option<RefreshObserver>,
}

impl<P: ServiceProber, E: EpgSource> RefreshOrchestrator<P, E> {
    pub fn new(prober: P, epg: E, pacing: Pacing, cancel: CancelToken) -> Self {
        Self {
            prober,
            epg,
            pacing,
            cancel,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: RefreshObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// 按给定顺序刷新全部服务。中断时返回已完成的部分并标记 `interrupted`。
    pub fn run(&mut self, services: &[ServiceCandidate], duration: SampleDuration) -> RunReport {
        let total = services.len();
        let mut report = RunReport {
            planned_services: total,
            ..RunReport::default()
        };
        if services.is_empty() {
            info!("没有需要刷新 EPG 的服务");
            return report;
        }

        info!("开始流采样刷新: {} 个服务, 每个 {}", total, duration);
        for (index, service) in services.iter().enumerate() {
            let paced = if index == 0 {
                self.cancel.check()
            } else {
                self.cancel.sleep(self.pacing.between_services)
            };
            if paced.is_err() {
                report.interrupted = true;
                break;
            }

            self.emit(RefreshEvent::ServiceStarted {
                index,
                total,
                service,
            });
            match self.refresh_service(service.clone(), duration) {
                Ok(outcome) => {
                    report.summary.record(&outcome);
                    self.emit(RefreshEvent::ServiceFinished {
                        index,
                        total,
                        outcome: &outcome,
                    });
                    report.outcomes.push(outcome);
                }
                Err(Cancelled) => {
                    warn!("刷新在 {} 处被中断", service.display_name);
                    report.interrupted = true;
                    break;
                }
            }
        }

        let summary = report.summary;
        info!(
            "刷新结束: {}/{} 采样成功, 新增 {} 个 EPG 事件{}",
            summary.successful_probes,
            total,
            summary.total_new_events,
            if report.interrupted { " (已中断)" } else { "" }
        );
        report
    }

    fn refresh_service(
        &self,
        service: ServiceCandidate,
        duration: SampleDuration,
    ) -> Result<RefreshOutcome, Cancelled> {
        let mut state = ServiceState::Pending(service);
        loop {
            state = match state {
                ServiceState::Done(outcome) => return Ok(outcome),
                other => self.advance(other, duration)?,
            };
        }
    }

    fn advance(
        &self,
        state: ServiceState,
        duration: SampleDuration,
    ) -> Result<ServiceState, Cancelled> {
        Ok(match state {
            ServiceState::Pending(service) => ServiceState::Probing(service),
            ServiceState::Probing(service) => {
                match self.prober.probe_service(&service, duration)? {
                    ServiceProbe::Tuned(result) => ServiceState::Succeeded(service, result),
                    ServiceProbe::Exhausted {
                        attempts,
                        best_bytes,
                    } => {
                        debug!("{}: {} 个端点均失败", service.display_name, attempts);
                        ServiceState::Failed(service, best_bytes)
                    }
                }
            }
            ServiceState::Failed(service, best_bytes) => {
                let mut outcome = RefreshOutcome::probe_failed(service);
                outcome.bytes_received = best_bytes;
                info!("{}: 采样失败", outcome.service.display_name);
                ServiceState::Done(outcome)
            }
            ServiceState::Succeeded(service, result) => {
                self.cancel.sleep(self.pacing.settle)?;
                ServiceState::Verifying(service, result)
            }
            ServiceState::Verifying(service, result) => {
                let verification = match self.epg.event_count(&service.reference) {
                    Ok(count) => Verification::Counted(count),
                    Err(err) => {
                        warn!("{}: EPG 复查失败: {}", service.display_name, err);
                        Verification::Failed(err.to_string())
                    }
                };
                let outcome = RefreshOutcome::verified(service, &result, verification);
                info!(
                    "{}: {}KB, EPG {} 个事件 (+{})",
                    outcome.service.display_name,
                    outcome.bytes_received / 1024,
                    outcome.event_count_after,
                    outcome.new_events
                );
                ServiceState::Done(outcome)
            }
            done @ ServiceState::Done(_) => done,
        })
    }

    fn emit(&mut self, event: RefreshEvent<'_>) {
        if let Some(observer) = self.observer.as_mut() {
            observer(event);
        }
    }
}
