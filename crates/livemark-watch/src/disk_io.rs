use std::path::Path;
use std::time::{Duration, SystemTime};
use std::{fs, io, thread};

const STABLE_READ_RETRIES: usize = 3;
const STABLE_READ_RETRY_SLEEP: Duration = Duration::from_millis(5);

/// File metadata captured alongside re-read content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStats {
    pub size: u64,
    pub modified: SystemTime,
    pub created: SystemTime,
}

pub(crate) fn file_stats(path: &Path) -> io::Result<FileStats> {
    let meta = fs::metadata(path)?;
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    // Not every filesystem records a birth time.
    let created = meta.created().unwrap_or(modified);
    Ok(FileStats {
        size: meta.len(),
        modified,
        created,
    })
}

/// Read a file as UTF-8, retrying until metadata is identical before
/// and after the read, so a mid-write snapshot is never returned.
pub(crate) fn read_stable(path: &Path) -> io::Result<(String, FileStats)> {
    let mut last_err = None;
    for _ in 0..STABLE_READ_RETRIES {
        let before = file_stats(path)?;

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                last_err = Some(err);
                thread::sleep(STABLE_READ_RETRY_SLEEP);
                continue;
            }
        };

        let after = match file_stats(path) {
            Ok(stats) => stats,
            Err(err) => {
                last_err = Some(err);
                thread::sleep(STABLE_READ_RETRY_SLEEP);
                continue;
            }
        };

        if before == after {
            return Ok((text, after));
        }

        thread::sleep(STABLE_READ_RETRY_SLEEP);
    }

    Err(last_err.unwrap_or_else(|| io::Error::other("file changed while reading")))
}
