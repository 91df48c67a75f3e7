//! 多线程批量下载
//!
//! The scheduler walks the requests in input order and hands each one to a
//! scoped worker thread once a slot is free. At most `max_threads` workers
//! run at any instant. A failing item never cancels its siblings; every
//! request is attempted exactly once and the report lists the outcomes in
//! input order.

use crate::config::{Config, SlotWait};
use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::save::{save_one, DownloadOutcome, DownloadRequest};
use crossbeam_channel::{bounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Where the URLs of a batch come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// URLs given directly, used as-is
    Inline(Vec<String>),
    /// Text file with one URL per line, blank lines ignored
    File(PathBuf),
}

impl From<Vec<String>> for Source {
    fn from(urls: Vec<String>) -> Self {
        Source::Inline(urls)
    }
}

impl From<&[&str]> for Source {
    fn from(urls: &[&str]) -> Self {
        Source::Inline(urls.iter().map(|url| url.to_string()).collect())
    }
}

impl Source {
    /// 解析为有序的下载请求
    pub fn requests(&self) -> Result<Vec<DownloadRequest>> {
        match self {
            Source::Inline(urls) => Ok(urls.iter().map(DownloadRequest::new).collect()),
            Source::File(path) => {
                let file = File::open(path).map_err(|err| input_error(path, err))?;
                let mut requests = Vec::new();
                for line in BufReader::new(file).lines() {
                    let line = line.map_err(|err| input_error(path, err))?;
                    let url = line.trim();
                    if !url.is_empty() {
                        requests.push(DownloadRequest::new(url));
                    }
                }
                Ok(requests)
            }
        }
    }
}

fn input_error(path: &Path, err: io::Error) -> Error {
    Error::Input(format!("could not read url list {}: {}", path.display(), err))
}

/// 批量下载的汇总结果
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One outcome per request, in input order
    pub outcomes: Vec<DownloadOutcome>,
    /// Highest number of workers observed running at once
    pub peak_active: usize,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.succeeded)
    }

    /// First failure in input order, if any
    pub fn into_first_error(self) -> Option<Error> {
        self.outcomes.into_iter().find_map(|outcome| outcome.error)
    }
}

/// 工作线程池的状态，记录当前活跃的线程数
struct WorkerPool {
    limit: usize,
    active: AtomicUsize,
    peak: AtomicUsize,
    wait: SlotWait,
    poll_interval: std::time::Duration,
    // 有界channel充当计数信号量
    slots: (Sender<()>, Receiver<()>),
}

impl WorkerPool {
    /// Never holds more slots than there are requests
    fn new(config: &Config, requests: usize) -> Self {
        let limit = config.max_threads().min(requests.max(1));
        Self {
            limit,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            wait: config.slot_wait,
            poll_interval: config.poll_interval(),
            slots: bounded(limit),
        }
    }

    /// Blocks until a worker may start, then counts it as active
    fn acquire(&self) {
        match self.wait {
            SlotWait::Semaphore => {
                // the pool owns both ends, so the channel never disconnects
                let _ = self.slots.0.send(());
            }
            SlotWait::Poll => {
                while self.active.load(Ordering::SeqCst) >= self.limit {
                    thread::sleep(self.poll_interval);
                }
            }
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.wait == SlotWait::Semaphore {
            let _ = self.slots.1.recv();
        }
    }

    fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Releases the slot even if the save panics
struct SlotGuard<'a>(&'a WorkerPool);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// 批量下载器
pub struct BatchScheduler<'a, F: Fetch + ?Sized> {
    fetcher: &'a F,
    config: &'a Config,
}

impl<'a, F: Fetch + ?Sized> BatchScheduler<'a, F> {
    pub fn new(fetcher: &'a F, config: &'a Config) -> Self {
        Self { fetcher, config }
    }

    /// Runs every request of `source`, saving into `directory`.
    ///
    /// Only problems before dispatch (unreadable source, directory that
    /// cannot be created) are returned as errors; per-item failures are in
    /// the report.
    pub fn run(&self, source: &Source, directory: &Path) -> Result<BatchReport> {
        let requests = source.requests()?;
        fs::create_dir_all(directory).map_err(|err| Error::filesystem(directory, err))?;
        if requests.is_empty() {
            debug!("empty batch, nothing to download");
            return Ok(BatchReport::default());
        }

        let pool = WorkerPool::new(self.config, requests.len());
        info!(
            "downloading {} file(s) into {} with {} thread(s)",
            requests.len(),
            directory.display(),
            pool.limit
        );

        let outcomes = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(requests.len());
            for (index, request) in requests.into_iter().enumerate() {
                pool.acquire();
                debug!("dispatching #{} {} ({} active)", index, request.url, pool.active());
                let fallback = request.clone();
                let pool = &pool;
                let mut rng = self.worker_rng(index);
                let spawned = thread::Builder::new()
                    .name(format!("grab-{}", index))
                    .spawn_scoped(scope, move || {
                        let _slot = SlotGuard(pool);
                        save_one(self.fetcher, request, directory, self.config, &mut rng)
                    });
                match spawned {
                    Ok(handle) => handles.push((fallback, Some(handle))),
                    Err(err) => {
                        // the closure was dropped without running
                        pool.release();
                        error!("could not spawn worker for {}: {}", fallback.url, err);
                        handles.push((fallback, None));
                    }
                }
            }

            handles
                .into_iter()
                .map(|(request, handle)| {
                    let url = request.url.clone();
                    match handle.map(|handle| handle.join()) {
                        Some(Ok(outcome)) => outcome,
                        Some(Err(_)) => DownloadOutcome::failed(
                            request,
                            Error::Input(format!("worker for {} panicked", url)),
                        ),
                        None => DownloadOutcome::failed(
                            request,
                            Error::Input(format!("no worker thread available for {}", url)),
                        ),
                    }
                })
                .collect::<Vec<_>>()
        });

        for outcome in &outcomes {
            match &outcome.error {
                Some(err) => warn!("{} failed: {}", outcome.request.url, err),
                None => info!("{} done", outcome.request.url),
            }
        }

        Ok(BatchReport {
            outcomes,
            peak_active: pool.peak.load(Ordering::SeqCst),
        })
    }

    /// 每个worker独立的随机数生成器
    fn worker_rng(&self, index: usize) -> StdRng {
        match self.config.name_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_entropy(),
        }
    }
}
