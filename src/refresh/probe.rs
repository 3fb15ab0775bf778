//! 单端点流采样。
//!
//! 打开一个流端点，在采样时长内按 16 KiB 分块读取，只计数不解析，
//! 结束后按内容类别的阈值判定这次"调谐"是否成功。

use std::io::{self, Read};
use std::time::{Duration, Instant};

use tracing::debug;

use super::duration::SampleDuration;
use super::models::{ContentCategory, ProbeResult, StreamEndpoint};
use super::thresholds::ThresholdTable;
use crate::base_system::interrupt::{CancelToken, Cancelled};

pub const CHUNK_SIZE: usize = 16 * 1024;

/// 端点级错误：由端点回退逻辑就地处理，不会中止整轮刷新。
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("cancelled")]
    Cancelled,
}

impl From<Cancelled> for EndpointError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl EndpointError {
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Status(code) if *code >= 500)
    }
}

/// 已建立的流连接；`body` 被丢弃时连接即释放。
pub struct OpenedStream<R> {
    pub status: u16,
    pub content_type: String,
    pub body: R,
}

pub trait StreamTransport {
    type Body: Read;

    /// 非 2xx 状态必须返回 `EndpointError::Status`。
    ///
    /// 连接在 `duration.request_deadline()` 之前不得被传输层关闭，
    /// 采样循环自己在 `duration` 到期时停止。
    fn open(
        &self,
        endpoint: &StreamEndpoint,
        duration: SampleDuration,
    ) -> Result<OpenedStream<Self::Body>, EndpointError>;

    /// 日志里显示的完整地址。
    fn describe(&self, endpoint: &StreamEndpoint) -> String;
}

pub struct StreamProbe<T> {
    transport: T,
    thresholds: ThresholdTable,
    server_error_backoff: Duration,
    cancel: CancelToken,
}

impl<T: StreamTransport> StreamProbe<T> {
    pub fn new(transport: T, cancel: CancelToken) -> Self {
        Self {
            transport,
            thresholds: ThresholdTable::default(),
            server_error_backoff: Duration::from_millis(100),
            cancel,
        }
    }

    pub fn with_server_error_backoff(mut self, backoff: Duration) -> Self {
        self.server_error_backoff = backoff;
        self
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// 采样一个端点。
    ///
    /// HTTP 错误与网络错误以 `Err` 返回；连接建立后的读错误只结束读取循环，
    /// 已读到的数据照常参与判定。
    pub fn probe(
        &self,
        endpoint: &StreamEndpoint,
        duration: SampleDuration,
    ) -> Result<ProbeResult, EndpointError> {
        self.cancel.check()?;
        debug!(
            "连接 {} (read timeout {:?}, deadline {:?}, duration {})",
            self.transport.describe(endpoint),
            duration.read_timeout(),
            duration.request_deadline(),
            duration
        );

        let start = Instant::now();
        let opened = match self.transport.open(endpoint, duration) {
            Ok(opened) => opened,
            Err(err) => {
                debug!("端点失败: {}", err);
                if err.is_server_error() {
                    // 嵌入式服务器偶尔过载，稍等再交给下一个端点
                    self.cancel.sleep(self.server_error_backoff)?;
                }
                return Err(err);
            }
        };

        let category = ContentCategory::from_content_type(&opened.content_type);
        let limits = self.thresholds.limits(category);
        debug!(
            "已连接: HTTP {}, Content-Type: {:?} ({:?})",
            opened.status, opened.content_type, category
        );

        let mut body = opened.body;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut bytes_received: u64 = 0;
        let mut chunk_count: u64 = 0;
        let deadline = start + duration.as_duration();

        while Instant::now() < deadline {
            self.cancel.check()?;

            let want = (limits.ceiling - bytes_received).min(CHUNK_SIZE as u64) as usize;
            match read_chunk(&mut body, &mut buf[..want], deadline) {
                Ok(0) => {
                    debug!("流已结束 (EOF)");
                    break;
                }
                Ok(n) => {
                    bytes_received += n as u64;
                    chunk_count += 1;
                    if chunk_count <= 3 {
                        debug!(
                            "块 {}: {} 字节 (累计 {}KB)",
                            chunk_count,
                            n,
                            bytes_received / 1024
                        );
                    }
                }
                Err(err) => {
                    debug!("读取中断: {}", err);
                    break;
                }
            }

            if bytes_received >= limits.ceiling {
                debug!("达到读取上限: {}KB", bytes_received / 1024);
                break;
            }
        }
        drop(body);

        let success = self
            .thresholds
            .is_success(category, bytes_received, chunk_count);
        let result = ProbeResult {
            success,
            bytes_received,
            chunk_count,
            content_category: category,
            elapsed: start.elapsed(),
        };
        debug!(
            "采样结束: {} 字节, {} 块, 下限 {}, 用时 {:.2}s, 成功={}",
            result.bytes_received,
            result.chunk_count,
            limits.min_success,
            result.elapsed_secs(),
            result.success
        );
        Ok(result)
    }
}

/// 尽量填满 `buf`，直到 EOF、出错或到达截止时间；已读到的部分优先返回。
fn read_chunk<R: Read>(body: &mut R, buf: &mut [u8], deadline: Instant) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        if filled > 0 && Instant::now() >= deadline {
            break;
        }
        match body.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if filled == 0 => return Err(err),
            Err(_) => break,
        }
    }
    Ok(filled)
}
