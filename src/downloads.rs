//! HTTP downloads with MD5 verification
//!
//! Mod files and the native d3dcompiler_47 DLL are fetched file by file,
//! verified against the expected MD5 and stamped with the server's
//! `Last-Modified` time.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use md5::{Digest, Md5};

use crate::error::{LauncherError, Result};
use crate::logging::{log_debug, log_error};

const USER_AGENT: &str = concat!("truckersmp-cli/", env!("CARGO_PKG_VERSION"));
const BUFSIZE: usize = 64 * 256;

/// One file to fetch: server path, local destination, expected MD5 (hex).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDownload {
    pub path: String,
    pub dest: PathBuf,
    pub md5: String,
}

fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new().user_agent(USER_AGENT).build()
}

/// Fetch a whole resource into memory.
pub fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    let response = agent()
        .get(url)
        .call()
        .map_err(|e| LauncherError::Download(format!("{}: {}", url, e)))?;
    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|e| LauncherError::Download(format!("{}: {}", url, e)))?;
    Ok(body)
}

/// Fetch a text resource.
pub fn fetch_string(url: &str) -> Result<String> {
    let body = fetch_bytes(url)?;
    String::from_utf8(body).map_err(|e| LauncherError::Download(format!("{}: {}", url, e)))
}

/// Whether the file at `path` has the given MD5 digest.
pub fn check_hash(path: &Path, md5: &str) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; BUFSIZE * 16];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()).eq_ignore_ascii_case(md5))
}

/// Download every entry of `files` from `base_url`.
///
/// Entries are removed as they complete, so after a failure `files` holds
/// only what is still missing and can be retried against another server.
pub fn download_files(base_url: &str, files: &mut Vec<FileDownload>) -> Result<()> {
    let agent = agent();
    let total = files.len();
    let mut count = 1;

    while let Some(file) = files.first() {
        download_one(&agent, base_url, file, (count, total))?;
        files.remove(0);
        count += 1;
    }
    Ok(())
}

fn download_one(
    agent: &ureq::Agent,
    base_url: &str,
    file: &FileDownload,
    (count, total): (usize, usize),
) -> Result<()> {
    let url = format!("{}{}", base_url, file.path);
    let name = file.path.rsplit('/').next().unwrap_or(&file.path);
    let name_getting = format!("[{}/{}] Get: {}", count, total, name);
    let fail = |e: &dyn std::fmt::Display| {
        let message = format!("Failed to download {}: {}", url, e);
        log_error(&message);
        LauncherError::Download(message)
    };

    if let Some(destdir) = file.dest.parent() {
        log_debug(&format!("Downloading file {} to {}", url, destdir.display()));
        fs::create_dir_all(destdir).map_err(|e| fail(&e))?;
    }

    // redirects are followed by the agent
    let response = agent.get(&url).call().map_err(|e| fail(&e))?;
    let last_modified = response.header("Last-Modified").map(str::to_string);
    let content_len: Option<u64> = response
        .header("Content-Length")
        .and_then(|len| len.parse().ok());

    let mut out = File::create(&file.dest).map_err(|e| fail(&e))?;
    let mut reader = response.into_reader();
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; BUFSIZE];
    let mut downloaded: u64 = 0;
    loop {
        let n = reader.read(&mut buf).map_err(|e| fail(&e))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(|e| fail(&e))?;
        hasher.update(&buf[..n]);
        downloaded += n as u64;

        let progress = match content_len {
            Some(len) => format!("{} / {}", group_thousands(downloaded), group_thousands(len)),
            None => group_thousands(downloaded),
        };
        print!("\r{:40}{:>40}", name_getting, progress);
        let _ = io::stdout().flush();
    }

    if !format!("{:x}", hasher.finalize()).eq_ignore_ascii_case(&file.md5) {
        println!("\r{:40}{:>40}", name, "MD5 MISMATCH");
        let message = format!("MD5 mismatch for {}", file.dest.display());
        log_error(&message);
        return Err(LauncherError::Download(message));
    }

    // wget-like timestamping
    if let Some(mtime) = last_modified.as_deref().and_then(parse_http_date) {
        let _ = out.set_modified(mtime);
    }

    println!("\r{:40}{:>40}", name, "OK");
    Ok(())
}

/// Parse an HTTP date such as `Wed, 21 Oct 2015 07:28:00 GMT`.
fn parse_http_date(value: &str) -> Option<SystemTime> {
    chrono::DateTime::parse_from_rfc2822(value)
        .ok()
        .map(SystemTime::from)
}

/// `1234567` -> `1,234,567`
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
