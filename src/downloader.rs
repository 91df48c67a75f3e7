//! Public entry points.
//!
//! [`Downloader`] pairs a fetcher with a [`Config`] and applies the
//! `raise_on_error` policy: with it on, the first error is returned; with it
//! off, the error is logged and an empty value (`false`, an empty path,
//! empty bytes...) comes back instead.

use crate::batch::{BatchReport, BatchScheduler, Source};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::ftp::FtpFetcher;
use crate::http::HttpFetcher;
use crate::save::{save_one, DownloadRequest};
use crate::speed::{IpVersion, SpeedReport};
use crate::{git, speed, unzip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::fmt::{self, Formatter};
use std::path::{Path, PathBuf};

/// 文件下载器
pub struct Downloader<F = HttpFetcher> {
    fetcher: F,
    config: Config,
}

impl<F> fmt::Display for Downloader<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "downloader({})", self.config)
    }
}

impl Default for Downloader<HttpFetcher> {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader<HttpFetcher> {
    pub fn new() -> Self {
        Self {
            fetcher: HttpFetcher::new(),
            config: Config::default(),
        }
    }

    /// Body as text, decoded with `encoding` when given
    pub fn text(&self, url: &str, encoding: Option<&str>) -> Result<String> {
        let result = self.fetcher.text(url, encoding, self.config.timeout);
        self.settle(url, result, String::new)
    }

    /// Response headers of a HEAD request
    pub fn headers(&self, url: &str, follow_redirects: bool) -> Result<HashMap<String, String>> {
        let result = self
            .fetcher
            .headers(url, follow_redirects, self.config.timeout);
        self.settle(url, result, HashMap::new)
    }
}

impl<F: Fetch> Downloader<F> {
    pub fn with_fetcher(fetcher: F) -> Self {
        Self {
            fetcher,
            config: Config::default(),
        }
    }

    /// 设置配置
    pub fn set_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// 根据配置决定返回错误还是空值
    fn settle<T>(&self, what: &str, result: Result<T>, sentinel: impl FnOnce() -> T) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if self.config.raise_on_error => Err(err),
            Err(err) => {
                warn!("{}: {}", what, err);
                Ok(sentinel())
            }
        }
    }

    fn rng(&self) -> StdRng {
        match self.config.name_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub fn bytes(&self, url: &str) -> Result<Vec<u8>> {
        let result = self
            .fetcher
            .fetch(url, self.config.timeout)
            .and_then(|payload| payload.into_bytes(url, self.config.timeout));
        self.settle(url, result, Vec::new)
    }

    /// Body parsed as JSON; the sentinel is an empty object
    pub fn json(&self, url: &str) -> Result<serde_json::Value> {
        let result = self
            .fetcher
            .fetch(url, self.config.timeout)
            .and_then(|payload| payload.into_bytes(url, self.config.timeout))
            .and_then(|body| serde_json::from_slice::<serde_json::Value>(&body).map_err(Error::from));
        self.settle(url, result, || serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Saves `url` to `path`, or into the base directory under a resolved name.
    ///
    /// A relative `path` is taken from the base directory; the returned path
    /// is always absolute.
    pub fn save(&self, url: &str, path: Option<&Path>) -> Result<PathBuf> {
        let base_dir = self.config.base_dir();
        let mut request = DownloadRequest::new(url);
        if let Some(path) = path.filter(|path| !path.as_os_str().is_empty()) {
            request = request.with_destination(base_dir.join(path));
        }
        let outcome = save_one(
            &self.fetcher,
            request,
            &base_dir,
            &self.config,
            &mut self.rng(),
        );
        self.settle(url, outcome.into_result(), PathBuf::new)
    }

    /// Runs a batch and returns every outcome.
    ///
    /// Files go to `directory`, or the base directory when absent. Errors
    /// are only returned for problems before dispatch, whatever the
    /// `raise_on_error` setting.
    pub fn run_batch(&self, source: &Source, directory: Option<&Path>) -> Result<BatchReport> {
        let directory = match directory {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => self.config.base_dir(),
        };
        BatchScheduler::new(&self.fetcher, &self.config).run(source, &directory)
    }

    /// 多线程下载，全部成功时返回true
    pub fn save_multi(&self, source: impl Into<Source>, directory: Option<&Path>) -> Result<bool> {
        let source = source.into();
        let result = self.run_batch(&source, directory).and_then(|report| {
            if report.all_succeeded() {
                return Ok(true);
            }
            if self.config.raise_on_error {
                if let Some(err) = report.into_first_error() {
                    return Err(err);
                }
            }
            Ok(false)
        });
        self.settle("batch", result, || false)
    }

    /// Saves an `ftp://` URL
    pub fn ftp(&self, ftp_url: &str, path: Option<&Path>) -> Result<PathBuf> {
        let base_dir = self.config.base_dir();
        let mut request = DownloadRequest::new(ftp_url);
        if let Some(path) = path.filter(|path| !path.as_os_str().is_empty()) {
            request = request.with_destination(base_dir.join(path));
        }
        let outcome = save_one(
            &FtpFetcher,
            request,
            &base_dir,
            &self.config,
            &mut self.rng(),
        );
        self.settle(ftp_url, outcome.into_result(), PathBuf::new)
    }

    /// 下载zip并解压，返回解压目录
    pub fn save_unzip(&self, zip_url: &str, extract_path: Option<&Path>, delete_after: bool) -> Result<PathBuf> {
        let result = unzip::save_unzip(&self.fetcher, &self.config, zip_url, extract_path, delete_after);
        self.settle(zip_url, result, PathBuf::new)
    }

    pub fn git_clone(&self, git_url: &str, clone_dir: Option<&Path>) -> Result<PathBuf> {
        let result = git::git_clone(&self.fetcher, &self.config, git_url, clone_dir);
        self.settle(git_url, result, PathBuf::new)
    }

    /// 下载测速
    pub fn down_speed(&self, size_mb: u32, ipv: IpVersion, port: u16) -> Result<SpeedReport> {
        let result = speed::down_speed(&self.fetcher, &self.config, size_mb, ipv, port);
        self.settle("speed test", result, SpeedReport::default)
    }
}

/// Batch download with a default HTTP downloader
pub fn save_multi(source: impl Into<Source>, directory: Option<&Path>, config: Config) -> Result<bool> {
    Downloader::new().set_config(config).save_multi(source, directory)
}

/// Single download with a default HTTP downloader
pub fn save(url: &str, path: Option<&Path>, config: Config) -> Result<PathBuf> {
    Downloader::new().set_config(config).save(url, path)
}
