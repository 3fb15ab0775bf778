//! 基于 HTTP 的流端点传输。

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, CACHE_CONTROL, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderValue,
    USER_AGENT,
};

use super::ReceiverAddress;
use crate::refresh::duration::SampleDuration;
use crate::refresh::models::StreamEndpoint;
use crate::refresh::probe::{EndpointError, OpenedStream, StreamTransport};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpStreamTransport {
    client: Client,
    address: ReceiverAddress,
}

impl HttpStreamTransport {
    pub fn new(address: ReceiverAddress, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .default_headers(stream_headers(user_agent))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client, address })
    }
}

/// 嵌入式流服务器兼容性最好的请求头：不压缩（字节计数不变）、不保持连接、不缓存。
fn stream_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .unwrap_or(HeaderValue::from_static("VLC/3.0.16 LibVLC/3.0.16")),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers
}

impl StreamTransport for HttpStreamTransport {
    type Body = Response;

    fn open(
        &self,
        endpoint: &StreamEndpoint,
        duration: SampleDuration,
    ) -> Result<OpenedStream<Response>, EndpointError> {
        let url = self.address.stream_url(endpoint);
        // blocking 客户端的 timeout 覆盖整个请求（含读取 body），所以用 D + 读超时
        let resp = self
            .client
            .get(&url)
            .timeout(duration.request_deadline())
            .send()
            .map_err(|e| EndpointError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EndpointError::Status(status.as_u16()));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(OpenedStream {
            status: status.as_u16(),
            content_type,
            body: resp,
        })
    }

    fn describe(&self, endpoint: &StreamEndpoint) -> String {
        self.address.stream_url(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::base_system::interrupt::CancelToken;
    use crate::receiver::mock;
    use crate::refresh::fallback::endpoints_for;
    use crate::refresh::models::ContentCategory;
    use crate::refresh::probe::StreamProbe;

    fn probe_for(port: u16) -> StreamProbe<HttpStreamTransport> {
        let address = ReceiverAddress::new("127.0.0.1", port, port);
        let transport = HttpStreamTransport::new(address, "VLC/3.0.16 LibVLC/3.0.16").unwrap();
        StreamProbe::new(transport, CancelToken::new()).with_server_error_backoff(Duration::ZERO)
    }

    fn primary(reference: &str) -> StreamEndpoint {
        endpoints_for(reference, false).remove(0)
    }

    #[test]
    fn stream_headers_disable_compression_and_keep_alive() {
        let headers = stream_headers("VLC/3.0.16 LibVLC/3.0.16");
        assert_eq!(headers[ACCEPT_ENCODING], "identity");
        assert_eq!(headers[CONNECTION], "close");
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        assert_eq!(headers[USER_AGENT], "VLC/3.0.16 LibVLC/3.0.16");
    }

    #[test]
    fn video_stream_over_http_succeeds() {
        let mock = mock::spawn();
        let duration = SampleDuration::new(2.0).unwrap();
        let result = probe_for(mock.port())
            .probe(&primary(mock::DAS_ERSTE), duration)
            .unwrap();

        assert!(result.success);
        assert_eq!(result.content_category, ContentCategory::Video);
        assert_eq!(result.bytes_received, 96 * 1024);
        assert_eq!(result.chunk_count, 6);
    }

    #[test]
    fn short_text_stream_over_http_fails_threshold() {
        let mock = mock::spawn();
        let duration = SampleDuration::new(1.0).unwrap();
        let result = probe_for(mock.port())
            .probe(&primary(mock::INFO), duration)
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.content_category, ContentCategory::Other);
        assert_eq!(result.bytes_received, 1024);
    }

    #[test]
    fn http_error_statuses_are_endpoint_errors() {
        let mock = mock::spawn();
        let duration = SampleDuration::new(1.0).unwrap();
        let probe = probe_for(mock.port());

        let err = probe
            .probe(&primary("1:0:1:DEAD:1:1:C00000:0:0:0:"), duration)
            .unwrap_err();
        assert!(matches!(err, EndpointError::Status(404)));

        let err = probe
            .probe(&primary(mock::MAINTENANCE), duration)
            .unwrap_err();
        assert!(matches!(err, EndpointError::Status(503)));
    }

    #[test]
    fn connection_refused_is_a_transport_error() {
        let duration = SampleDuration::new(0.5).unwrap();
        let err = probe_for(1)
            .probe(&primary(mock::DAS_ERSTE), duration)
            .unwrap_err();
        assert!(matches!(err, EndpointError::Transport(_)));
    }

    /// 每 20ms 写一个 TS 小块的流服务器，直到客户端断开。
    fn spawn_live_stream() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request);
            let header = "HTTP/1.1 200 OK\r\nContent-Type: video/mp2t\r\nConnection: close\r\n\r\n";
            if socket.write_all(header.as_bytes()).is_err() {
                return;
            }
            let packet = [0x47u8; 1316];
            while socket.write_all(&packet).is_ok() {
                thread::sleep(Duration::from_millis(20));
            }
        });
        port
    }

    #[test]
    fn long_sample_reads_past_the_read_timeout_cap() {
        let port = spawn_live_stream();
        let duration = SampleDuration::new(21.0).unwrap();
        assert!(duration.read_timeout() < duration.as_duration());

        let start = Instant::now();
        let result = probe_for(port)
            .probe(&primary(mock::DAS_ERSTE), duration)
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs_f64(20.9), "{:?}", start.elapsed());
        assert!(result.success);
        assert_eq!(result.content_category, ContentCategory::Video);
    }
}
