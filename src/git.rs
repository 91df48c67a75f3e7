//! 通过仓库的zip归档“克隆”git仓库

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::unzip::save_unzip;
use regex::Regex;
use std::path::{Path, PathBuf};

const FALLBACK_BRANCH: &str = "master";

fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|err| Error::Input(format!("bad pattern {}: {}", re, err)))
}

/// Repository URL without its `.git` suffix
pub fn repo_base(git_url: &str) -> Result<String> {
    let git_url = git_url.trim();
    let suffix = pattern(r"(?i)\.git$")?;
    if !suffix.is_match(git_url) {
        return Err(Error::Input(format!("{} must end with .git", git_url)));
    }
    Ok(suffix.replace(git_url, "").into_owned())
}

/// GitHub API endpoint describing the repository, for github.com URLs only
pub fn github_api_url(repo_base: &str) -> Result<Option<String>> {
    let github = pattern(r"(?i)^https?://(?:www\.)?github\.com/([^/]+)/([^/?#]+)")?;
    Ok(github
        .captures(repo_base)
        .map(|caps| format!("https://api.github.com/repos/{}/{}", &caps[1], &caps[2])))
}

pub fn archive_url(repo_base: &str, branch: &str) -> String {
    format!("{}/archive/refs/heads/{}.zip", repo_base, branch)
}

/// 查询仓库的默认分支
pub fn default_branch<F: Fetch + ?Sized>(fetcher: &F, config: &Config, repo_base: &str) -> Result<Option<String>> {
    let api = match github_api_url(repo_base)? {
        Some(api) => api,
        None => return Ok(None),
    };
    let body = fetcher.fetch(&api, config.timeout)?.into_bytes(&api, config.timeout)?;
    let data: serde_json::Value = serde_json::from_slice(&body)?;
    Ok(data
        .get("default_branch")
        .and_then(|branch| branch.as_str())
        .map(str::trim)
        .filter(|branch| !branch.is_empty())
        .map(str::to_string))
}

/// Downloads the default branch archive of `git_url` and extracts it.
///
/// Without `clone_dir` the repository lands in a folder named after it
/// inside the base directory. Returns the clone directory.
pub fn git_clone<F: Fetch + ?Sized>(
    fetcher: &F,
    config: &Config,
    git_url: &str,
    clone_dir: Option<&Path>,
) -> Result<PathBuf> {
    let base = repo_base(git_url)?;
    let branch = match default_branch(fetcher, config, &base) {
        Ok(branch) => branch,
        Err(err) if config.raise_on_error => return Err(err),
        Err(err) => {
            warn!("could not look up default branch of {}: {}", base, err);
            None
        }
    }
    .unwrap_or_else(|| FALLBACK_BRANCH.to_string());

    let destination = match clone_dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => {
            let name = base.trim_end_matches('/').rsplit('/').next().unwrap_or("");
            if name.is_empty() {
                return Err(Error::Input(format!("cannot name a folder after {}", git_url)));
            }
            config.base_dir().join(name)
        }
    };
    info!("cloning {} ({}) into {}", base, branch, destination.display());
    save_unzip(fetcher, config, &archive_url(&base, &branch), Some(&destination), true)
}

#[cfg(test)]
mod git_test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::FakeFetcher;
    use crate::unzip::unzip_test::zip_bytes;
    use std::fs;

    #[test]
    fn test_repo_base_requires_git_suffix() {
        assert_eq!(repo_base("https://github.com/x011/dload.GIT").unwrap(), "https://github.com/x011/dload");
        assert_eq!(repo_base("not-a-git-url").unwrap_err().kind(), ErrorKind::Input);
    }

    #[test]
    fn test_github_api_url() {
        assert_eq!(
            github_api_url("https://github.com/owner/project").unwrap().as_deref(),
            Some("https://api.github.com/repos/owner/project")
        );
        assert_eq!(github_api_url("https://gitlab.com/owner/project").unwrap(), None);
    }

    #[test]
    fn test_clone_uses_default_branch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new()
            .with_body("https://api.github.com/repos/owner/project", br#"{"default_branch": "main"}"#)
            .with_body(
                "https://github.com/owner/project/archive/refs/heads/main.zip",
                &zip_bytes(&[("project-main/README.md", "hello")]),
            );
        let config = Config::new().set_base_dir(dir.path());
        let cloned = git_clone(&fetcher, &config, "https://github.com/owner/project.git", None).unwrap();
        assert_eq!(cloned, dir.path().join("project"));
        assert_eq!(
            fs::read_to_string(cloned.join("project-main").join("README.md")).unwrap(),
            "hello"
        );
        assert!(!dir.path().join("main.zip").exists());
    }

    #[test]
    fn test_other_hosts_fall_back_to_master() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("checkout");
        let fetcher = FakeFetcher::new().with_body(
            "https://git.example.org/team/tool/archive/refs/heads/master.zip",
            &zip_bytes(&[("tool-master/main.rs", "fn main() {}")]),
        );
        let config = Config::new().set_base_dir(dir.path());
        let cloned = git_clone(&fetcher, &config, "https://git.example.org/team/tool.git", Some(&target)).unwrap();
        assert_eq!(cloned, target);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[test]
    fn test_branch_lookup_failure_is_tolerated_when_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new().with_body(
            "https://github.com/owner/project/archive/refs/heads/master.zip",
            &zip_bytes(&[("project-master/a.txt", "a")]),
        );
        let quiet = Config::new().set_base_dir(dir.path()).set_raise_on_error(false);
        assert!(git_clone(&fetcher, &quiet, "https://github.com/owner/project.git", None).is_ok());

        let strict = Config::new().set_base_dir(dir.path());
        let err = git_clone(&fetcher, &strict, "https://github.com/owner/project.git", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
