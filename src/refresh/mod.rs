//! EPG 刷新核心：不依赖具体传输与接收机接口，可用脚本化传输单独测试。
//!
//! 子模块：
//! - `duration`     — 采样时长与读超时
//! - `models`       — 服务、端点、采样结果与运行汇总
//! - `thresholds`   — 按内容类别的读取上限与成功门槛
//! - `probe`        — 单端点采样（`StreamTransport` 抽象 + 截止时间读取循环）
//! - `fallback`     — 按顺序尝试服务的各个流端点
//! - `orchestrator` — 逐个服务采样、复查 EPG、汇总结果

pub mod duration;
pub mod fallback;
pub mod models;
pub mod orchestrator;
pub mod probe;
pub mod thresholds;
