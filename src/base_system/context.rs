//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `epg_refresh.yml` 的字段元信息。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};
use crate::refresh::duration::SampleDuration;
use crate::refresh::orchestrator::Pacing;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 接收机端口
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,

    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 采样配置
    #[serde(default = "default_duration")]
    pub default_duration: f64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_inter_service_delay_ms")]
    pub inter_service_delay_ms: u64,
    #[serde(default = "default_server_error_backoff_ms")]
    pub server_error_backoff_ms: u64,
    #[serde(default = "default_false")]
    pub secondary_endpoints: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_port: default_control_port(),
            stream_port: default_stream_port(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            default_duration: default_duration(),
            settle_delay_ms: default_settle_delay_ms(),
            inter_service_delay_ms: default_inter_service_delay_ms(),
            server_error_backoff_ms: default_server_error_backoff_ms(),
            secondary_endpoints: default_false(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "epg_refresh.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 9] = [
            FieldMeta {
                name: "control_port",
                description: "接收机 Web 接口端口（服务列表 / EPG 查询）",
            },
            FieldMeta {
                name: "stream_port",
                description: "接收机流服务器端口（直接 TS 流）",
            },
            FieldMeta {
                name: "request_timeout",
                description: "Web 接口请求超时时间（秒）",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent（媒体播放器标识兼容性最好）",
            },
            FieldMeta {
                name: "default_duration",
                description: "未指定 --duration 时每个服务的采样时长（秒，0.5-30.0）",
            },
            FieldMeta {
                name: "settle_delay_ms",
                description: "采样成功后等待 EPG 收集的时间, 单位ms",
            },
            FieldMeta {
                name: "inter_service_delay_ms",
                description: "两个服务之间的间隔, 单位ms",
            },
            FieldMeta {
                name: "server_error_backoff_ms",
                description: "流端点返回 5xx 后的退避时间, 单位ms",
            },
            FieldMeta {
                name: "secondary_endpoints",
                description: "主端点失败后是否尝试 Web 接口端口上的备用流地址",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.control_port == 0 || self.stream_port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::Validation(
                "request_timeout must be at least 1 second".to_string(),
            ));
        }
        SampleDuration::new(self.default_duration)
            .map_err(|e| ConfigError::Validation(format!("default_duration: {e}")))?;
        Ok(())
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            settle: Duration::from_millis(self.settle_delay_ms),
            between_services: Duration::from_millis(self.inter_service_delay_ms),
        }
    }

    pub fn server_error_backoff(&self) -> Duration {
        Duration::from_millis(self.server_error_backoff_ms)
    }
}

fn default_false() -> bool {
    false
}

fn default_control_port() -> u16 {
    80
}

fn default_stream_port() -> u16 {
    8001
}

fn default_request_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    "VLC/3.0.16 LibVLC/3.0.16".to_string()
}

fn default_duration() -> f64 {
    4.0
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_inter_service_delay_ms() -> u64 {
    200
}

fn default_server_error_backoff_ms() -> u64 {
    100
}
