//! 下载并解压zip文件

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::save::{save_one, DownloadRequest};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Extracts every safely named entry of `archive` below `destination`.
///
/// Entries whose names would escape `destination` are skipped. Returns the
/// extracted file paths.
pub fn extract_zip(archive: &Path, destination: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive).map_err(|err| Error::filesystem(archive, err))?;
    let mut zip = ZipArchive::new(file)?;
    fs::create_dir_all(destination).map_err(|err| Error::filesystem(destination, err))?;

    let mut extracted = Vec::new();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                warn!("skipping entry with unsafe path {:?}", entry.name());
                continue;
            }
        };
        let path = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&path).map_err(|err| Error::filesystem(&path, err))?;
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::filesystem(parent, err))?;
        }
        let mut out = File::create(&path).map_err(|err| Error::filesystem(&path, err))?;
        io::copy(&mut entry, &mut out).map_err(|err| Error::filesystem(&path, err))?;
        extracted.push(path);
    }
    debug!("extracted {} file(s) into {}", extracted.len(), destination.display());
    Ok(extracted)
}

/// Downloads `zip_url` into the base directory and extracts it.
///
/// The archive is always overwritten. Without `extract_path` the files land
/// in a folder named after the archive. Returns the extraction directory.
pub fn save_unzip<F: Fetch + ?Sized>(
    fetcher: &F,
    config: &Config,
    zip_url: &str,
    extract_path: Option<&Path>,
    delete_after: bool,
) -> Result<PathBuf> {
    let base_dir = config.base_dir();
    let save_config = config.clone().set_overwrite(true);
    let mut rng = match config.name_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let zip_path = save_one(fetcher, DownloadRequest::new(zip_url), &base_dir, &save_config, &mut rng)
        .into_result()?;

    let destination = match extract_path {
        Some(path) if !path.as_os_str().is_empty() => path.to_path_buf(),
        _ => {
            let folder = zip_path
                .file_stem()
                .map(|stem| stem.to_os_string())
                .ok_or_else(|| Error::Input(format!("cannot name a folder after {}", zip_path.display())))?;
            base_dir.join(folder)
        }
    };
    extract_zip(&zip_path, &destination)?;

    if delete_after && zip_path.is_file() {
        fs::remove_file(&zip_path).map_err(|err| Error::filesystem(&zip_path, err))?;
    }
    info!("{} extracted to {}", zip_url, destination.display());
    Ok(destination)
}
