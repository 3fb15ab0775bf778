//! 中断信号：Ctrl+C 触发共享取消标记，所有等待点都能被唤醒。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::warn;

/// 取消等待时返回的标记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    flag: AtomicBool,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                wake_tx,
                wake_rx,
            }),
        }
    }

    /// 触发取消；返回之前是否已经被取消过。
    pub fn cancel(&self) -> bool {
        let already = self.inner.flag.swap(true, Ordering::SeqCst);
        if !already {
            let _ = self.inner.wake_tx.try_send(());
        }
        already
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// 可被取消打断的等待。
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.check()?;
        if duration.is_zero() {
            return Ok(());
        }
        match self.inner.wake_rx.recv_timeout(duration) {
            Ok(()) => {
                // 唤醒信号只有一个，放回去给后续等待者
                let _ = self.inner.wake_tx.try_send(());
                Err(Cancelled)
            }
            Err(_) => self.check(),
        }
    }
}

/// 安装 Ctrl+C 处理：第一次触发取消，第二次直接退出。
pub fn install_handler(token: &CancelToken) -> Result<(), ctrlc::Error> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        if token.cancel() {
            eprintln!("再次中断，立即退出");
            std::process::exit(130);
        }
        warn!("收到中断信号，将在当前步骤结束后停止（再按一次 Ctrl+C 立即退出）");
    })
}
