//! 基础设施：配置文件、日志、中断处理。

pub mod config;
pub mod context;
pub mod interrupt;
pub mod logging;
