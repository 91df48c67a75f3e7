//! 单个文件的保存逻辑
//!
//! [`save_one`] never fails: every error ends up inside the returned
//! [`DownloadOutcome`]. The body is streamed into a temporary file next to
//! the target and renamed into place only once the transfer is complete, so
//! a failed download leaves nothing behind.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, Payload};
use crate::filename::{resolve_name, url_filename};
use rand::Rng;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One entry of a download job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    /// Explicit file path, bypassing name resolution
    pub destination_hint: Option<PathBuf>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination_hint: None,
        }
    }

    pub fn with_destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination_hint = Some(path.into());
        self
    }
}

/// 单次保存的结果
#[derive(Debug)]
pub struct DownloadOutcome {
    pub request: DownloadRequest,
    pub local_path: Option<PathBuf>,
    pub succeeded: bool,
    /// The file already existed and overwrite was off
    pub skipped: bool,
    pub error: Option<Error>,
}

impl DownloadOutcome {
    fn saved(request: DownloadRequest, path: PathBuf) -> Self {
        Self {
            request,
            local_path: Some(path),
            succeeded: true,
            skipped: false,
            error: None,
        }
    }

    fn skipped(request: DownloadRequest, path: PathBuf) -> Self {
        Self {
            request,
            local_path: Some(path),
            succeeded: true,
            skipped: true,
            error: None,
        }
    }

    pub(crate) fn failed(request: DownloadRequest, error: Error) -> Self {
        Self {
            request,
            local_path: None,
            succeeded: false,
            skipped: false,
            error: Some(error),
        }
    }

    /// Converts back into a plain result, yielding the saved path
    pub fn into_result(self) -> Result<PathBuf> {
        match (self.error, self.local_path) {
            (Some(err), _) => Err(err),
            (None, Some(path)) => Ok(path),
            (None, None) => Err(Error::Input(format!("no file saved for {}", self.request.url))),
        }
    }
}

/// Saves `request` below `directory` (or at its destination hint).
pub fn save_one<F, R>(
    fetcher: &F,
    request: DownloadRequest,
    directory: &Path,
    config: &Config,
    rng: &mut R,
) -> DownloadOutcome
where
    F: Fetch + ?Sized,
    R: Rng + ?Sized,
{
    // 先根据url确定路径，文件已存在时无需请求网络
    let candidate = match &request.destination_hint {
        Some(path) => Some(path.clone()),
        None => url_filename(&request.url).map(|name| directory.join(name)),
    };
    if let Some(path) = &candidate {
        if !config.overwrite && path.is_file() {
            debug!("{} exists, skipping {}", path.display(), request.url);
            return DownloadOutcome::skipped(request, path.clone());
        }
    }

    let mut payload = match fetcher.fetch(&request.url, config.timeout) {
        Ok(payload) => payload,
        Err(err) => return DownloadOutcome::failed(request, err),
    };

    let target = match &request.destination_hint {
        Some(path) => path.clone(),
        None => {
            let name = resolve_name(&request.url, payload.content_disposition.as_deref(), rng);
            directory.join(name)
        }
    };
    if !config.overwrite && Some(&target) != candidate.as_ref() && target.is_file() {
        debug!("{} exists, skipping {}", target.display(), request.url);
        return DownloadOutcome::skipped(request, target);
    }

    match write_payload(&request.url, &mut payload, &target, config) {
        Ok(()) => DownloadOutcome::saved(request, target),
        Err(err) => DownloadOutcome::failed(request, err),
    }
}

/// 分块写入临时文件，完成后重命名为目标文件
fn write_payload(url: &str, payload: &mut Payload, target: &Path, config: &Config) -> Result<()> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|err| Error::filesystem(&parent, err))?;
    let mut temp = NamedTempFile::new_in(&parent).map_err(|err| Error::filesystem(&parent, err))?;

    let mut buf = vec![0u8; config.chunk_size()];
    let mut written: u64 = 0;
    loop {
        let read = payload
            .body()
            .read(&mut buf)
            .map_err(|err| Error::from_read(url, config.timeout, err))?;
        if read == 0 {
            break;
        }
        temp.write_all(&buf[..read])
            .map_err(|err| Error::filesystem(temp.path(), err))?;
        written += read as u64;
    }
    temp.flush().map_err(|err| Error::filesystem(temp.path(), err))?;

    if let Some(expected) = payload.content_length {
        if written != expected {
            return Err(Error::Network {
                url: url.to_string(),
                message: format!("transfer ended after {} of {} bytes", written, expected),
            });
        }
    }

    temp.persist(target)
        .map_err(|err| Error::filesystem(target, err.error))?;
    info!("saved {} ({} bytes) to {}", url, written, target.display());
    Ok(())
}

#[cfg(test)]
mod save_test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::FakeFetcher;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::{self, Cursor};
    use std::time::Duration;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(1)
    }

    #[test]
    fn test_save_writes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new().with_body("http://a.test/x.bin", b"AAA");
        let outcome = save_one(
            &fetcher,
            DownloadRequest::new("http://a.test/x.bin"),
            dir.path(),
            &Config::new(),
            &mut rng(),
        );
        assert!(outcome.succeeded);
        assert!(!outcome.skipped);
        let path = outcome.local_path.unwrap();
        assert_eq!(path, dir.path().join("x.bin"));
        assert_eq!(fs::read(path).unwrap(), b"AAA");
    }

    #[test]
    fn test_existing_file_is_skipped_without_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new().with_body("http://a.test/x.bin", b"new");
        let config = Config::new();
        let first = save_one(&fetcher, DownloadRequest::new("http://a.test/x.bin"), dir.path(), &config, &mut rng());
        let second = save_one(&fetcher, DownloadRequest::new("http://a.test/x.bin"), dir.path(), &config, &mut rng());
        assert_eq!(fetcher.call_count(), 1);
        assert!(second.succeeded);
        assert!(second.skipped);
        assert_eq!(first.local_path, second.local_path);
    }

    #[test]
    fn test_overwrite_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.bin"), b"old").unwrap();
        let fetcher = FakeFetcher::new().with_body("http://a.test/x.bin", b"new");
        let outcome = save_one(
            &fetcher,
            DownloadRequest::new("http://a.test/x.bin"),
            dir.path(),
            &Config::new().set_overwrite(true),
            &mut rng(),
        );
        assert!(outcome.succeeded);
        assert_eq!(fs::read(dir.path().join("x.bin")).unwrap(), b"new");
    }

    #[test]
    fn test_header_name_and_random_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new()
            .with_disposition("http://a.test/get?id=3", b"doc", "attachment; filename=\"report.pdf\"")
            .with_body("http://a.test/", b"index");
        let config = Config::new();
        let named = save_one(&fetcher, DownloadRequest::new("http://a.test/get?id=3"), dir.path(), &config, &mut rng());
        assert_eq!(named.local_path.unwrap(), dir.path().join("report.pdf"));

        let random = save_one(&fetcher, DownloadRequest::new("http://a.test/"), dir.path(), &config, &mut rng());
        let path = random.local_path.unwrap();
        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(fs::read(path).unwrap(), b"index");
    }

    #[test]
    fn test_failure_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new().with_failure("http://a.test/y.bin", ErrorKind::Network);
        let outcome = save_one(&fetcher, DownloadRequest::new("http://a.test/y.bin"), dir.path(), &Config::new(), &mut rng());
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error.as_ref().map(Error::kind), Some(ErrorKind::Network));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// Yields some bytes, then breaks the connection
    struct BrokenBody {
        sent: bool,
    }

    impl Read for BrokenBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"half");
            Ok(4)
        }
    }

    struct BrokenFetcher;

    impl Fetch for BrokenFetcher {
        fn fetch(&self, _url: &str, _timeout: Duration) -> Result<Payload> {
            Ok(Payload::new(BrokenBody { sent: false }))
        }
    }

    #[test]
    fn test_interrupted_transfer_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = save_one(
            &BrokenFetcher,
            DownloadRequest::new("http://a.test/big.iso"),
            dir.path(),
            &Config::new().set_chunk_size(4),
            &mut rng(),
        );
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error.unwrap().kind(), ErrorKind::Network);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    struct ShortFetcher;

    impl Fetch for ShortFetcher {
        fn fetch(&self, _url: &str, _timeout: Duration) -> Result<Payload> {
            Ok(Payload::new(Cursor::new(b"abc".to_vec())).with_content_length(Some(10)))
        }
    }

    #[test]
    fn test_truncated_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = save_one(&ShortFetcher, DownloadRequest::new("http://a.test/t.bin"), dir.path(), &Config::new(), &mut rng());
        assert!(!outcome.succeeded);
        assert!(!dir.path().join("t.bin").exists());
    }

    #[test]
    fn test_destination_hint_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("custom.dat");
        let fetcher = FakeFetcher::new().with_body("http://a.test/x.bin", b"AAA");
        let outcome = save_one(
            &fetcher,
            DownloadRequest::new("http://a.test/x.bin").with_destination(&target),
            dir.path(),
            &Config::new(),
            &mut rng(),
        );
        assert_eq!(outcome.into_result().unwrap(), target);
        assert_eq!(fs::read(&target).unwrap(), b"AAA");
    }
}
