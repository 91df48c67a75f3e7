use std::fmt::{self, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 批量下载时等待空闲线程的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotWait {
    /// Counting semaphore, the scheduler wakes as soon as a worker finishes
    Semaphore,
    /// Sleep for `poll_interval` and recheck the active count
    Poll,
}

/// 下载配置
#[derive(Debug, Clone)]
pub struct Config {
    pub timeout: Duration,       //单个请求超时
    pub chunk_size: usize,       //写入磁盘的块大小
    pub overwrite: bool,         //是否覆盖已存在的文件
    pub max_threads: usize,      //最大并发数
    pub poll_interval: Duration, //轮询间隔
    pub slot_wait: SlotWait,
    pub raise_on_error: bool,
    pub base_dir: Option<PathBuf>, //默认保存目录，为空时使用当前目录
    pub name_seed: Option<u64>,    //随机文件名的种子
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            overwrite: false,
            max_threads: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
            slot_wait: SlotWait::Semaphore,
            raise_on_error: true,
            base_dir: None,
            name_seed: None,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timeout:{:?} chunk_size:{} overwrite:{} max_threads:{} slot_wait:{:?} raise_on_error:{}",
            self.timeout,
            self.chunk_size,
            self.overwrite,
            self.max_threads(),
            self.slot_wait,
            self.raise_on_error
        )
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }
    /// 设置超时时间
    pub fn set_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
    pub fn set_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
    pub fn set_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
    /// 设置线程数
    pub fn set_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }
    /// Switches the batch scheduler to sleep-and-recheck slot waiting
    pub fn set_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.slot_wait = SlotWait::Poll;
        self
    }
    pub fn set_slot_wait(mut self, slot_wait: SlotWait) -> Self {
        self.slot_wait = slot_wait;
        self
    }
    pub fn set_raise_on_error(mut self, raise_on_error: bool) -> Self {
        self.raise_on_error = raise_on_error;
        self
    }
    /// 设置保存路径
    pub fn set_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }
    pub fn set_name_seed(mut self, seed: u64) -> Self {
        self.name_seed = Some(seed);
        self
    }

    /// Worker bound, never below one
    pub fn max_threads(&self) -> usize {
        self.max_threads.max(1)
    }

    pub fn chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }

    pub fn poll_interval(&self) -> Duration {
        if self.poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            self.poll_interval
        }
    }

    /// 默认保存目录
    pub fn base_dir(&self) -> PathBuf {
        let cwd = std::env::current_dir().unwrap_or_else(|_| Path::new(".").to_path_buf());
        match &self.base_dir {
            Some(dir) => cwd.join(dir),
            None => cwd,
        }
    }
}
