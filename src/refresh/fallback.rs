//! 端点回退：按固定优先级依次采样，首个成功即返回。

use tracing::debug;

use super::duration::SampleDuration;
use super::models::{ProbeResult, ServiceCandidate, StreamEndpoint, TransportPort};
use super::probe::{EndpointError, StreamProbe, StreamTransport};
use crate::base_system::interrupt::Cancelled;

/// 服务的候选流端点，由服务引用确定。
///
/// 主端点是流端口上的直接 TS 地址；`include_secondary` 打开时追加 Web 接口端口上的备用地址。
pub fn endpoints_for(reference: &str, include_secondary: bool) -> Vec<StreamEndpoint> {
    let encoded = urlencoding::encode(reference);
    let mut endpoints = vec![StreamEndpoint {
        path: format!("/{encoded}"),
        port: TransportPort::Stream,
    }];
    if include_secondary {
        endpoints.extend(
            [
                format!("/web/ts?sRef={encoded}"),
                format!("/web/stream.m3u8?ref={encoded}"),
                format!("/web/stream?ref={encoded}"),
            ]
            .into_iter()
            .map(|path| StreamEndpoint {
                path,
                port: TransportPort::Control,
            }),
        );
    }
    endpoints
}

/// 依次尝试，第一个 `Ok(Some(_))` 胜出；`Err` 立即中止。
pub fn first_success<I, T, E, F>(items: I, attempt: F) -> Result<Option<T>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Result<Option<T>, E>,
{
    items
        .into_iter()
        .map(attempt)
        .find_map(Result::transpose)
        .transpose()
}

/// 一个服务的采样结论。
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceProbe {
    Tuned(ProbeResult),
    /// 所有端点都失败；`best_bytes` 为各次尝试中收到的最多字节数
    Exhausted { attempts: usize, best_bytes: u64 },
}

pub trait ServiceProber {
    fn probe_service(
        &self,
        service: &ServiceCandidate,
        duration: SampleDuration,
    ) -> Result<ServiceProbe, Cancelled>;
}

impl<T: ServiceProber + ?Sized> ServiceProber for &T {
    fn probe_service(
        &self,
        service: &ServiceCandidate,
        duration: SampleDuration,
    ) -> Result<ServiceProbe, Cancelled> {
        (**self).probe_service(service, duration)
    }
}

pub struct EndpointFallback<T> {
    probe: StreamProbe<T>,
    include_secondary: bool,
}

impl<T: StreamTransport> EndpointFallback<T> {
    pub fn new(probe: StreamProbe<T>, include_secondary: bool) -> Self {
        Self {
            probe,
            include_secondary,
        }
    }
}

impl<T: StreamTransport> ServiceProber for EndpointFallback<T> {
    fn probe_service(
        &self,
        service: &ServiceCandidate,
        duration: SampleDuration,
    ) -> Result<ServiceProbe, Cancelled> {
        let endpoints = endpoints_for(&service.reference, self.include_secondary);
        let mut attempts = 0usize;
        let mut best_bytes = 0u64;

        let tuned = first_success(endpoints.iter().enumerate(), |(idx, endpoint)| {
            self.probe.cancel_token().check()?;
            attempts += 1;
            debug!("{} 端点 {}/{}", service.display_name, idx + 1, endpoints.len());
            match self.probe.probe(endpoint, duration) {
                Ok(result) if result.success => Ok(Some(result)),
                Ok(result) => {
                    debug!(
                        "数据不足: {} 字节 ({:?})",
                        result.bytes_received, result.content_category
                    );
                    best_bytes = best_bytes.max(result.bytes_received);
                    Ok(None)
                }
                Err(EndpointError::Cancelled) => Err(Cancelled),
                Err(err) => {
                    debug!("端点 {} 失败: {}", idx + 1, err);
                    Ok(None)
                }
            }
        })?;

        Ok(match tuned {
            Some(result) => ServiceProbe::Tuned(result),
            None => ServiceProbe::Exhausted {
                attempts,
                best_bytes,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::*;
    use crate::base_system::interrupt::CancelToken;
    use crate::refresh::probe::tests::ScriptedTransport;

    fn service() -> ServiceCandidate {
        ServiceCandidate {
            reference: "1:0:19:283D:3FB:1:C00000:0:0:0:".to_string(),
            display_name: "Das Erste HD".to_string(),
            current_event_count: 0,
        }
    }

    fn fallback(transport: ScriptedTransport, secondary: bool) -> EndpointFallback<ScriptedTransport> {
        let probe = StreamProbe::new(transport, CancelToken::new())
            .with_server_error_backoff(Duration::ZERO);
        EndpointFallback::new(probe, secondary)
    }

    fn secs(s: f64) -> SampleDuration {
        SampleDuration::new(s).unwrap()
    }

    #[test]
    fn primary_endpoint_is_escaped_direct_stream() {
        let endpoints = endpoints_for("1:0:19:283D:3FB:1:C00000:0:0:0:", false);
        assert_eq!(
            endpoints,
            vec![StreamEndpoint {
                path: "/1%3A0%3A19%3A283D%3A3FB%3A1%3AC00000%3A0%3A0%3A0%3A".to_string(),
                port: TransportPort::Stream,
            }]
        );
    }

    #[test]
    fn secondary_endpoints_follow_primary_on_control_port() {
        let endpoints = endpoints_for("1:0:1:6DCA:44D:1:C00000:0:0:0:", true);
        assert_eq!(endpoints.len(), 4);
        assert_eq!(endpoints[0].port, TransportPort::Stream);
        assert!(endpoints[1..].iter().all(|e| e.port == TransportPort::Control));
        assert!(endpoints[1].path.starts_with("/web/ts?sRef=1%3A0%3A1%3A6DCA"));
    }

    #[test]
    fn first_success_short_circuits() {
        let mut seen = Vec::new();
        let found: Result<Option<i32>, ()> = first_success([1, 2, 3, 4], |n| {
            seen.push(n);
            Ok((n % 2 == 0).then_some(n * 10))
        });
        assert_eq!(found, Ok(Some(20)));
        assert_eq!(seen, vec![1, 2]);

        let none: Result<Option<i32>, ()> = first_success(Vec::<i32>::new(), |_| Ok(Some(1)));
        assert_eq!(none, Ok(None));

        let err: Result<Option<i32>, &str> =
            first_success([1, 2], |n| if n == 1 { Err("stop") } else { Ok(Some(n)) });
        assert_eq!(err, Err("stop"));
    }

    #[test]
    fn not_found_without_secondary_is_exhausted() {
        let transport = ScriptedTransport::new().error(EndpointError::Status(404));
        let fb = fallback(transport, false);
        let outcome = fb.probe_service(&service(), secs(1.0)).unwrap();
        assert_eq!(
            outcome,
            ServiceProbe::Exhausted {
                attempts: 1,
                best_bytes: 0
            }
        );
    }

    #[test]
    fn falls_back_in_order_and_stops_at_first_success() {
        let transport = ScriptedTransport::new()
            .error(EndpointError::Status(503))
            .stream("text/html", Cursor::new(vec![0u8; 512]))
            .stream("video/mp2t", Cursor::new(vec![0x47u8; 64 * 1024]))
            .stream("video/mp2t", Cursor::new(vec![0x47u8; 64 * 1024]));
        let fb = fallback(transport, true);

        let outcome = fb.probe_service(&service(), secs(1.0)).unwrap();
        let ServiceProbe::Tuned(result) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(result.bytes_received, 64 * 1024);

        let opened = fb.probe.transport().opened.borrow();
        assert_eq!(opened.len(), 3);
        assert!(opened[0].starts_with("/1%3A0"));
        assert!(opened[1].starts_with("/web/ts?"));
        assert!(opened[2].starts_with("/web/stream.m3u8?"));
    }

    #[test]
    fn exhausted_reports_best_partial_read() {
        let transport = ScriptedTransport::new()
            .stream("text/plain", Cursor::new(vec![0u8; 1024]))
            .error(EndpointError::Transport("connection refused".into()))
            .stream("text/plain", Cursor::new(vec![0u8; 1500]))
            .error(EndpointError::Status(403));
        let fb = fallback(transport, true);
        let outcome = fb.probe_service(&service(), secs(1.0)).unwrap();
        assert_eq!(
            outcome,
            ServiceProbe::Exhausted {
                attempts: 4,
                best_bytes: 1500
            }
        );
    }

    #[test]
    fn cancellation_stops_before_next_endpoint() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let probe = StreamProbe::new(ScriptedTransport::new(), cancel);
        let fb = EndpointFallback::new(probe, true);
        assert_eq!(fb.probe_service(&service(), secs(1.0)), Err(Cancelled));
        assert!(fb.probe.transport().opened.borrow().is_empty());
    }
}
