use std::{fs, path::PathBuf};

use anyhow::bail;

const MEMORY_PREFIX: &str = "sqlite::memory:";
const URL_PREFIX: &str = "sqlite://";

pub fn validate_sqlite_url(url: &str) -> anyhow::Result<()> {
    if url.starts_with(MEMORY_PREFIX) {
        return Ok(());
    }

    if !url.starts_with(URL_PREFIX) {
        bail!("database url must start with `sqlite://` or use `sqlite::memory:`");
    }

    // Query params are connection options, not part of the file path.
    if path_part(url).is_empty() {
        bail!("database url is missing a filesystem component after `sqlite://`");
    }

    Ok(())
}

/// Creates the directory the database file will live in.
pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if url.starts_with(MEMORY_PREFIX) || !url.starts_with(URL_PREFIX) {
        return Ok(());
    }

    let fs_path = normalize_windows_style_sqlite_path(path_part(url));
    if let Some(parent) = fs_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn path_part(url: &str) -> &str {
    let rest = url.trim_start_matches(URL_PREFIX);
    rest.split_once('?').map(|(path, _)| path).unwrap_or(rest)
}

/// Drops the leading slash of `/C:/...` so drive-letter urls resolve.
pub fn normalize_windows_style_sqlite_path(path_part: &str) -> PathBuf {
    let bytes = path_part.as_bytes();
    let has_drive = bytes.first() == Some(&b'/')
        && bytes.get(1).map(|b| b.is_ascii_alphabetic()).unwrap_or(false)
        && bytes.get(2) == Some(&b':');
    let path_part = if has_drive { &path_part[1..] } else { path_part };

    #[cfg(windows)]
    {
        // `C:/data/x.db` is taken relative to the cwd on drive C.
        let bytes = path_part.as_bytes();
        if bytes.get(1) == Some(&b':') && matches!(bytes.get(2), Some(b'/') | Some(b'\\')) {
            let mut normalized = String::from(&path_part[..2]);
            normalized.push_str(&path_part[3..]);
            return PathBuf::from(normalized);
        }
        return PathBuf::from(path_part);
    }

    #[cfg(not(windows))]
    {
        PathBuf::from(path_part)
    }
}
