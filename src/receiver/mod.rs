//! 接收机访问：Web 接口（服务目录 / EPG 查询）与流服务器。
//!
//! 子模块：
//! - `xml`     — `e2servicelist` / `e2eventlist` 解析
//! - `client`  — 服务目录客户端（频道列表查找、EPG 计数、待刷新服务扫描）
//! - `stream`  — 基于 HTTP 的流端点传输

pub mod client;
pub mod stream;
pub mod xml;

#[cfg(test)]
pub(crate) mod mock;

use crate::refresh::models::{StreamEndpoint, TransportPort};

/// 接收机地址：同一主机上的 Web 接口端口与流端口。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverAddress {
    host: String,
    control_port: u16,
    stream_port: u16,
}

impl ReceiverAddress {
    /// `host` 可以带 `http://` 前缀或结尾的 `/`，都会被去掉。
    pub fn new(host: &str, control_port: u16, stream_port: u16) -> Self {
        let host = host
            .trim()
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        Self {
            host,
            control_port,
            stream_port,
        }
    }

    pub fn control_url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.control_port, path)
    }

    pub fn stream_url(&self, endpoint: &StreamEndpoint) -> String {
        let port = match endpoint.port {
            TransportPort::Stream => self.stream_port,
            TransportPort::Control => self.control_port,
        };
        format!("http://{}:{}{}", self.host, port, endpoint.path)
    }
}
