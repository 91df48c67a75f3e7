//! Download helpers for HTTP(S) and FTP.
//!
//! Fetch a URL as bytes, text, JSON or headers, save it to disk, unpack zip
//! archives, pull a repository through its archive, measure throughput, or
//! download whole lists of files on a bounded pool of threads.
//!
//! ```no_run
//! use grab::{Config, Downloader, Source};
//!
//! let downloader = Downloader::new().set_config(Config::new().set_max_threads(4));
//! let urls = vec!["https://example.com/a.bin".to_string(), "https://example.com/b.bin".to_string()];
//! let all_saved = downloader.save_multi(Source::Inline(urls), None).unwrap();
//! assert!(all_saved);
//! ```

#[macro_use]
extern crate log;

pub mod batch;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod fetch;
pub mod filename;
pub mod ftp;
pub mod git;
pub mod http;
pub mod save;
pub mod speed;
pub mod unzip;

#[cfg(test)]
mod test_support;

pub use batch::{BatchReport, BatchScheduler, Source};
pub use config::{Config, SlotWait};
pub use downloader::{save, save_multi, Downloader};
pub use error::{Error, ErrorKind, Result};
pub use fetch::{Fetch, Payload};
pub use ftp::FtpFetcher;
pub use http::HttpFetcher;
pub use save::{save_one, DownloadOutcome, DownloadRequest};
pub use speed::{IpVersion, SpeedReport};
