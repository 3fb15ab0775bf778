//! 交互层入口：无 UI 的命令行流程。

pub mod noui;
