//! Byte transfer for one item into the path machine's temp file.
//!
//! `http(s)` goes through a single curl GET (with a Range offset when a part
//! file is being resumed), `file://` is a local copy and `text:` writes the
//! literal payload after the prefix.

use anyhow::{Context, Result};
use std::cell::{Cell, RefCell};
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

/// Outcome of a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Total size of the file at `dest`, including any resumed prefix.
    pub size: u64,
    /// `Content-Type` of the final response, without parameters.
    pub content_type: Option<String>,
}

/// Fetch `url` into `dest`. When `resume_from` is non-zero and the server
/// honors the range, bytes are appended after that offset; otherwise the
/// file is rewritten from the start.
pub async fn fetch(url: &str, dest: &Path, resume_from: u64) -> Result<Fetched> {
    if let Some(text) = url.strip_prefix("text:") {
        tokio::fs::write(dest, text.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;
        return Ok(Fetched {
            size: text.len() as u64,
            content_type: Some("text/plain".to_string()),
        });
    }

    let parsed = url::Url::parse(url).with_context(|| format!("invalid URL {url:?}"))?;
    match parsed.scheme() {
        "file" => {
            let source = parsed
                .to_file_path()
                .map_err(|()| anyhow::anyhow!("not a local file URL: {url}"))?;
            let size = tokio::fs::copy(&source, dest)
                .await
                .with_context(|| format!("failed to copy {}", source.display()))?;
            Ok(Fetched {
                size,
                content_type: None,
            })
        }
        "http" | "https" => {
            let url = url.to_string();
            let dest = dest.to_path_buf();
            tokio::task::spawn_blocking(move || download_http(&url, &dest, resume_from))
                .await
                .context("transfer task panicked")?
        }
        other => anyhow::bail!("unsupported URL scheme {other:?}"),
    }
}

fn download_http(url: &str, dest: &Path, resume_from: u64) -> Result<Fetched> {
    let mut file = File::options()
        .create(true)
        .write(true)
        .truncate(resume_from == 0)
        .open(dest)
        .with_context(|| format!("failed to open {}", dest.display()))?;
    file.seek(SeekFrom::Start(resume_from))?;

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(30))?;
    easy.low_speed_limit(1024)?;
    easy.low_speed_time(Duration::from_secs(60))?;
    if resume_from > 0 {
        // Plain Range header: a 200 reply restarts the body instead of failing.
        easy.range(&format!("{}-", resume_from))?;
    }

    let status = Cell::new(0u32);
    let content_type = RefCell::new(None::<String>);
    let started = Cell::new(false);
    let write_error = RefCell::new(None::<std::io::Error>);
    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            let Ok(line) = std::str::from_utf8(data) else {
                return true;
            };
            let line = line.trim_end();
            if line.starts_with("HTTP/") {
                // New response (redirect hop): forget the previous headers.
                status.set(parse_status_line(line).unwrap_or(0));
                content_type.replace(None);
            } else if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-type") {
                    content_type.replace(Some(media_type(value).to_string()));
                }
            }
            true
        })?;
        transfer.write_function(|data| {
            if !started.replace(true) && resume_from > 0 && status.get() != 206 {
                // Range ignored: the body starts at byte 0.
                if let Err(e) = file.set_len(0).and_then(|()| file.seek(SeekFrom::Start(0))) {
                    write_error.replace(Some(e));
                    return Ok(0);
                }
            }
            match file.write_all(data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    tracing::warn!("write to {} failed: {}", dest.display(), e);
                    write_error.replace(Some(e));
                    Ok(0)
                }
            }
        })?;
        let performed = transfer.perform();
        if let Some(e) = write_error.take() {
            return Err(e).with_context(|| format!("failed to write {}", dest.display()));
        }
        performed.context("GET request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("GET {} returned HTTP {}", url, code);
    }
    file.flush()?;
    let size = fs::metadata(dest)?.len();
    tracing::debug!(url, size, code, "transfer complete");
    Ok(Fetched {
        size,
        content_type: content_type.into_inner(),
    })
}

fn parse_status_line(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// `image/jpeg; charset=x` -> `image/jpeg`.
fn media_type(value: &str) -> &str {
    value.split(';').next().unwrap_or("").trim()
}

/// File extension for a MIME type, if it is a well-known one.
pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = media_type(content_type).to_ascii_lowercase();
    let ext = match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        "text/plain" => "txt",
        "text/html" => "html",
        "application/json" => "json",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        _ => return None,
    };
    Some(ext)
}
