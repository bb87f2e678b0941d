use chrono::{DateTime, Local, NaiveDate};
use loghive_core::StorageError;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Date suffix of rotated files, e.g. `web.2024-01-15`
const ROTATED_DATE_FORMAT: &str = "%Y-%m-%d";

/// A log file that rotates at the first write of each new day
///
/// The active file keeps its plain name; the file of a finished day is
/// renamed to `<name>.<YYYY-MM-DD>` and at most `max_files` of those are kept.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_files: usize,
    file: File,
    /// Day the active file belongs to
    period: NaiveDate,
    lines_written: u64,
}

impl RotatingFile {
    /// Open (or create) the active file at `path`
    ///
    /// An existing file is attributed to the day it was last modified, so a
    /// restart after midnight still rotates yesterday's file.
    pub fn open(path: impl Into<PathBuf>, max_files: usize) -> Result<Self, StorageError> {
        let path = path.into();
        let file = open_append(&path)?;

        let period = file
            .metadata()
            .and_then(|m| m.modified())
            .map(|modified| DateTime::<Local>::from(modified).date_naive())
            .unwrap_or_else(|_| Local::now().date_naive());

        info!(path = %path.display(), "Opened log file for writing");

        Ok(Self {
            path,
            max_files: max_files.max(1),
            file,
            period,
            lines_written: 0,
        })
    }

    /// Append one line, rotating first if the day has changed
    pub fn append(&mut self, line: &str) -> Result<(), StorageError> {
        self.append_at(line, Local::now())
    }

    pub(crate) fn append_at(&mut self, line: &str, now: DateTime<Local>) -> Result<(), StorageError> {
        let today = now.date_naive();
        if today != self.period {
            self.rotate(today)?;
        }

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        self.file.write_all(&buf).map_err(|e| StorageError::Write {
            path: self.path.display().to_string(),
            source: e,
        })?;
        self.lines_written += 1;

        Ok(())
    }

    /// Move the active file aside and start a new one for `today`
    fn rotate(&mut self, today: NaiveDate) -> Result<(), StorageError> {
        let rotated_path = rotated_path(&self.path, self.period);

        if self.path.exists() {
            fs::rename(&self.path, &rotated_path).map_err(|e| StorageError::Rotate {
                path: self.path.display().to_string(),
                source: e,
            })?;

            info!(
                from = %self.path.display(),
                to = %rotated_path.display(),
                "Rotated log file"
            );
        }

        self.file = open_append(&self.path)?;
        self.period = today;

        self.cleanup_old_files();

        Ok(())
    }

    /// Remove rotated files beyond `max_files`, oldest first
    fn cleanup_old_files(&self) {
        let mut rotated = rotated_siblings(&self.path);
        rotated.sort_by(|a, b| a.0.cmp(&b.0));

        let to_remove = rotated.len().saturating_sub(self.max_files);
        for (_, path) in rotated.into_iter().take(to_remove) {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove old log file");
            } else {
                debug!(path = %path.display(), "Removed old log file");
            }
        }
    }

    /// Get the active file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written through this handle
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }
}

fn open_append(path: &Path) -> Result<File, StorageError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            source: e,
        })
}

/// Path a file is rotated to at the end of `period`
/// e.g., "logs/t1/app/web" + 2024-01-15 -> "logs/t1/app/web.2024-01-15"
fn rotated_path(path: &Path, period: NaiveDate) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}", period.format(ROTATED_DATE_FORMAT)));
    path.with_file_name(name)
}

/// Rotated files of `path` with the day each one covers
fn rotated_siblings(path: &Path) -> Vec<(NaiveDate, PathBuf)> {
    let Some(parent) = path.parent() else {
        return Vec::new();
    };
    let prefix = format!("{}.", path.file_name().unwrap_or_default().to_string_lossy());

    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %parent.display(), error = %e, "Failed to read log directory");
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let suffix = name.strip_prefix(&prefix)?;
            let date = NaiveDate::parse_from_str(suffix, ROTATED_DATE_FORMAT).ok()?;
            Some((date, entry.path()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn at(day: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_append_writes_lines() {
        let dir = TempDir::new().unwrap();
        let mut file = RotatingFile::open(dir.path().join("web"), 6).unwrap();

        file.append("first").unwrap();
        file.append("second").unwrap();

        assert_eq!(read(file.path()), "first\nsecond\n");
        assert_eq!(file.lines_written(), 2);
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web");
        RotatingFile::open(&path, 6).unwrap().append("one").unwrap();
        RotatingFile::open(&path, 6).unwrap().append("two").unwrap();

        assert_eq!(read(&path), "one\ntwo\n");
    }

    #[test]
    fn test_daily_rotation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web");
        let mut file = RotatingFile::open(&path, 6).unwrap();
        file.period = at(1).date_naive();

        file.append_at("day one", at(1)).unwrap();
        file.append_at("day one again", at(1) + Duration::hours(6)).unwrap();
        file.append_at("day two", at(2)).unwrap();

        assert_eq!(read(&path), "day two\n");
        assert_eq!(
            read(&dir.path().join("web.2024-01-01")),
            "day one\nday one again\n"
        );
    }

    #[test]
    fn test_reopen_after_midnight_rotates_previous_day() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web");
        fs::write(&path, "before restart\n").unwrap();

        let modified = std::time::SystemTime::now() - std::time::Duration::from_secs(3 * 86_400);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
        let last_day = DateTime::<Local>::from(modified).date_naive();

        let mut file = RotatingFile::open(&path, 6).unwrap();
        file.append("after restart").unwrap();

        assert_eq!(read(&rotated_path(&path, last_day)), "before restart\n");
        assert_eq!(read(&path), "after restart\n");
    }

    #[test]
    fn test_retention_keeps_newest_rotations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web");
        let mut file = RotatingFile::open(&path, 6).unwrap();
        file.period = at(1).date_naive();

        for day in 1..=10 {
            file.append_at(&format!("day {}", day), at(day)).unwrap();
        }

        let mut rotated: Vec<String> = rotated_siblings(&path)
            .into_iter()
            .map(|(date, _)| date.to_string())
            .collect();
        rotated.sort();
        assert_eq!(
            rotated,
            vec![
                "2024-01-04",
                "2024-01-05",
                "2024-01-06",
                "2024-01-07",
                "2024-01-08",
                "2024-01-09",
            ]
        );
        assert_eq!(read(&path), "day 10\n");
    }

    #[test]
    fn test_cleanup_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web");
        fs::write(dir.path().join("web.notes"), "keep").unwrap();
        fs::write(dir.path().join("webserver.2023-12-01"), "keep").unwrap();

        let mut file = RotatingFile::open(&path, 1).unwrap();
        file.period = at(1).date_naive();
        for day in 1..=3 {
            file.append_at("x", at(day)).unwrap();
        }

        assert!(dir.path().join("web.notes").exists());
        assert!(dir.path().join("webserver.2023-12-01").exists());
        assert_eq!(rotated_siblings(&path).len(), 1);
    }

    #[test]
    fn test_rotated_path() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let result = rotated_path(Path::new("/var/log/t1/app/web"), date);
        assert_eq!(result, PathBuf::from("/var/log/t1/app/web.2024-01-15"));

        let result = rotated_path(Path::new("/var/log/t1/app/web.log"), date);
        assert_eq!(result, PathBuf::from("/var/log/t1/app/web.log.2024-01-15"));
    }
}
