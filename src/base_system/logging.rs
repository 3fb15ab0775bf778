//! 日志：控制台 + `logs/latest.log`，退出时把本次日志压缩归档。

use std::fs::{self, File};
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, error};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry, fmt};
use zip::CompressionMethod;
use zip::write::FileOptions;

/// 启动时 latest.log 超过该大小就先归档。
const ROTATE_BYTES: u64 = 10 * 1024 * 1024;
const LATEST_LOG: &str = "latest.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("cannot install log subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
    #[error("log file error: {0}")]
    Io(#[from] io::Error),
    #[error("log archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("log timestamp error: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    /// 控制台输出 DEBUG（文件始终记录 DEBUG）
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    /// 关闭时控制台不输出任何日志，只写文件
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: true,
            console: true,
        }
    }
}

/// 日志目录与其中的 latest.log。
#[derive(Debug, Clone)]
struct LogDir {
    dir: PathBuf,
    latest: PathBuf,
}

impl LogDir {
    fn prepare(base_dir: Option<&Path>) -> io::Result<Self> {
        let dir = base_dir.unwrap_or(Path::new(".")).join("logs");
        fs::create_dir_all(&dir)?;
        let latest = dir.join(LATEST_LOG);
        Ok(Self { dir, latest })
    }

    fn rotate_if_large(&self) -> Result<(), LogError> {
        let size = fs::metadata(&self.latest).map(|m| m.len()).unwrap_or(0);
        if size >= ROTATE_BYTES {
            self.archive()?;
        }
        Ok(())
    }

    /// 把 latest.log 压缩为 `epg_refresh_<时间>.zip` 并删除原文件；空文件直接删除。
    fn archive(&self) -> Result<Option<PathBuf>, LogError> {
        let size = match fs::metadata(&self.latest) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if size == 0 {
            fs::remove_file(&self.latest)?;
            return Ok(None);
        }

        let stamp = OffsetDateTime::now_utc().format(format_description!(
            "[year]-[month]-[day]_[hour]-[minute]-[second]"
        ))?;
        let target = self.dir.join(format!("epg_refresh_{stamp}.zip"));

        let mut writer = zip::ZipWriter::new(File::create(&target)?);
        writer.start_file(
            format!("epg_refresh_{stamp}.log"),
            FileOptions::default().compression_method(CompressionMethod::Deflated),
        )?;
        io::copy(&mut File::open(&self.latest)?, &mut writer)?;
        writer.finish()?;

        fs::remove_file(&self.latest)?;
        Ok(Some(target))
    }
}

/// 关闭流程只执行一次：先刷新后台写线程，再按需归档。
struct Shutdown {
    log_dir: LogDir,
    guard: Mutex<Option<WorkerGuard>>,
    archive: bool,
    done: AtomicBool,
}

impl Shutdown {
    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.guard.lock() {
            drop(guard.take());
        }
        if self.archive {
            match self.log_dir.archive() {
                Ok(Some(path)) => eprintln!("日志已归档: {}", path.display()),
                Ok(None) => {}
                Err(err) => eprintln!("日志归档失败: {err}"),
            }
        }
    }
}

/// 持有期间日志有效；drop 时刷新并归档。
pub struct LogSystem {
    shutdown: Arc<Shutdown>,
}

impl LogSystem {
    /// `base_dir` 为 None 时日志写入当前目录下的 `logs/`。
    pub fn init(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let log_dir = LogDir::prepare(base_dir)?;
        log_dir.rotate_if_large()?;

        let appender = tracing_appender::rolling::never(&log_dir.dir, LATEST_LOG);
        let (file_writer, guard) = NonBlockingBuilder::default().lossy(false).finish(appender);

        let layers: Vec<BoxedLayer> = vec![
            console_layer(&options),
            fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_writer(file_writer)
                .with_filter(LevelFilter::DEBUG)
                .boxed(),
        ];
        tracing_subscriber::registry().with(layers).try_init()?;

        let shutdown = Arc::new(Shutdown {
            log_dir,
            guard: Mutex::new(Some(guard)),
            archive: options.archive_on_exit,
            done: AtomicBool::new(false),
        });
        install_panic_hook(Arc::clone(&shutdown));
        debug!("日志目录: {}", shutdown.log_dir.dir.display());

        Ok(Self { shutdown })
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.shutdown.run();
    }
}

fn console_layer(options: &LogOptions) -> BoxedLayer {
    let level = match (options.console, options.debug) {
        (false, _) => LevelFilter::OFF,
        (true, true) => LevelFilter::DEBUG,
        (true, false) => LevelFilter::INFO,
    };
    fmt::layer()
        .with_target(false)
        .with_ansi(options.use_color)
        .with_writer(BoxMakeWriter::new(io::stderr))
        .with_filter(level)
        .boxed()
}

fn install_panic_hook(shutdown: Arc<Shutdown>) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        match info.location() {
            Some(at) => error!("panic at {}:{}: {}", at.file(), at.line(), info),
            None => error!("panic: {info}"),
        }
        shutdown.run();
        previous(info);
    }));
}
