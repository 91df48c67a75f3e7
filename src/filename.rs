//! 从响应头或url中解析文件名

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::Path;
use url::Url;

/// Length of generated fallback names
pub const RANDOM_NAME_LEN: usize = 12;

/// Picks the local file name for `url`.
///
/// A `Content-Disposition` filename wins, then the last segment of the URL
/// path, then a random alphanumeric name drawn from `rng`.
pub fn resolve_name<R: Rng + ?Sized>(url: &str, content_disposition: Option<&str>, rng: &mut R) -> String {
    header_filename(content_disposition)
        .or_else(|| url_filename(url))
        .unwrap_or_else(|| random_name(rng))
}

/// 从content-disposition中提取文件名，filename*优先于filename
pub fn header_filename(content_disposition: Option<&str>) -> Option<String> {
    let value = content_disposition?;
    let mut extended: Option<String> = None;
    let mut plain: Option<String> = None;

    //按照;分割，第一段是disposition类型
    for part in value.split(';').skip(1) {
        let part = part.trim();
        let (key, raw) = match part.split_once('=') {
            Some((key, raw)) => (key.trim().to_ascii_lowercase(), raw.trim()),
            None => continue,
        };
        match key.as_str() {
            "filename*" => {
                // charset'lang'value
                let raw = match raw.find("''") {
                    Some(idx) => &raw[idx + 2..],
                    None => raw,
                };
                extended = clean_name(raw);
            }
            "filename" => plain = clean_name(raw),
            _ => {}
        }
    }
    extended.or(plain)
}

/// Last non-empty segment of the URL path, percent-decoded
pub fn url_filename(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        // scheme-less input such as "a.test/x.bin"
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    };
    let segment = path.rsplit('/').next().unwrap_or("");
    if segment.is_empty() {
        return None;
    }
    clean_name(segment)
}

/// 生成随机文件名
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..RANDOM_NAME_LEN)
        .map(|_| rng.sample(Alphanumeric) as char)
        .collect()
}

/// Strips quotes, percent-decodes and keeps only the base name
fn clean_name(raw: &str) -> Option<String> {
    let unquoted = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    let decoded = urlencoding::decode(unquoted)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| unquoted.to_string());
    let base = decoded.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Path::new(base)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}
