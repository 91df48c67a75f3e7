//! 下载测速

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::Fetch;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::{self, Formatter};
use std::io::Read;
use std::time::{Duration, Instant};

/// Test file sizes offered by the probe server, in megabytes
pub const SIZES: [u32; 8] = [5, 10, 20, 50, 100, 200, 512, 1024];

const PROBE_CHUNK: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    fn host_prefix(self) -> &'static str {
        match self {
            IpVersion::V4 => "ipv4",
            IpVersion::V6 => "ipv6",
        }
    }
}

/// 测速结果
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeedReport {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl SpeedReport {
    pub fn megabits_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 * 8.0 / 1_000_000.0 / secs
    }
}

impl fmt::Display for SpeedReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes in {:.2} seconds ({:.2} Mbps)",
            self.bytes,
            self.elapsed.as_secs_f64(),
            self.megabits_per_second()
        )
    }
}

pub fn speed_test_url(size_mb: u32, ipv: IpVersion, port: u16) -> Result<String> {
    if !SIZES.contains(&size_mb) {
        return Err(Error::Input(format!(
            "unsupported test size {}MB, pick one of {:?}",
            size_mb, SIZES
        )));
    }
    let remote = if size_mb == 1024 {
        "1GB".to_string()
    } else {
        format!("{}MB", size_mb)
    };
    Ok(format!(
        "http://{}.download.thinkbroadband.com:{}/{}.zip",
        ipv.host_prefix(),
        port,
        remote
    ))
}

/// Downloads `url` into memory and times it
pub fn measure<F: Fetch + ?Sized>(fetcher: &F, config: &Config, url: &str) -> Result<SpeedReport> {
    let began = Instant::now();
    let mut payload = fetcher.fetch(url, config.timeout)?;

    // 创建进度条
    let pb = match payload.content_length {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{bar:30}] {bytes}/{total_bytes} {bytes_per_sec}")
                    .progress_chars("= "),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let mut data: Vec<u8> = Vec::new();
    let mut buf = [0u8; PROBE_CHUNK];
    loop {
        let read = payload
            .body()
            .read(&mut buf)
            .map_err(|err| Error::from_read(url, config.timeout, err))?;
        if read == 0 {
            break;
        }
        data.extend_from_slice(&buf[..read]);
        pb.inc(read as u64);
    }
    pb.finish_and_clear();

    let report = SpeedReport {
        bytes: data.len() as u64,
        elapsed: began.elapsed(),
    };
    info!("{}: {}", url, report);
    Ok(report)
}

pub fn down_speed<F: Fetch + ?Sized>(
    fetcher: &F,
    config: &Config,
    size_mb: u32,
    ipv: IpVersion,
    port: u16,
) -> Result<SpeedReport> {
    let url = speed_test_url(size_mb, ipv, port)?;
    measure(fetcher, config, &url)
}
