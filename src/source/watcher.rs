use crate::source::parser::{parse_line, ParseError};
use crate::source::record::Record;
use std::fs::{File, Metadata};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to tail file {}: {source}", .path.display())]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to process line {line_number} of {}: {source}", .path.display())]
    Line {
        path: PathBuf,
        line_number: u64,
        #[source]
        source: ParseError,
    },

    #[error("io error while reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Fail setup instead of waiting when the file is absent
    pub must_exist: bool,
    /// Keep waiting for appended lines after reaching end of file
    pub follow: bool,
    /// How often to poll for file creation and new content
    pub poll_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            must_exist: true,
            follow: false,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Tails one log file and turns its lines into records.
pub struct FileWatcher {
    path: PathBuf,
    format_tag: String,
    options: WatchOptions,

    file: Option<BufReader<File>>,
    file_inode: Option<u64>,
    current_offset: u64,
    line_number: u64,
    // Bytes of a line whose newline has not been written yet
    pending: Vec<u8>,
}

impl FileWatcher {
    pub fn new(path: PathBuf, format_tag: impl Into<String>, options: WatchOptions) -> Self {
        Self {
            path,
            format_tag: format_tag.into(),
            options,
            file: None,
            file_inode: None,
            current_offset: 0,
            line_number: 0,
            pending: Vec::new(),
        }
    }

    /// Run until the file is exhausted (or forever when following).
    ///
    /// Parsed records go to `results`, every failure to `errors`. Line
    /// failures do not stop the watcher; setup and read failures do.
    pub async fn run(mut self, results: mpsc::Sender<Record>, errors: mpsc::Sender<WatchError>) {
        info!(
            path = %self.path.display(),
            format = %self.format_tag,
            follow = self.options.follow,
            "Starting file watcher"
        );

        if let Err(source) = self.open().await {
            let e = WatchError::Setup {
                path: self.path.clone(),
                source,
            };
            error!(path = %self.path.display(), error = %e, "File watcher setup failed");
            let _ = errors.send(e).await;
            return;
        }

        loop {
            let line = match self.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!(
                        path = %self.path.display(),
                        lines = self.line_number,
                        "Reached end of file"
                    );
                    return;
                }
                Err(source) => {
                    let _ = errors
                        .send(WatchError::Io {
                            path: self.path.clone(),
                            source,
                        })
                        .await;
                    return;
                }
            };

            self.line_number += 1;
            debug!(path = %self.path.display(), line_number = self.line_number, "Line tailed");

            let sent = match parse_line(&self.path, &line, &self.format_tag, self.line_number) {
                Ok(record) => results.send(record).await.is_ok(),
                Err(source) => errors
                    .send(WatchError::Line {
                        path: self.path.clone(),
                        line_number: self.line_number,
                        source,
                    })
                    .await
                    .is_ok(),
            };

            if !sent {
                debug!(path = %self.path.display(), "Consumer gone, stopping file watcher");
                return;
            }
        }
    }

    /// Open the file, waiting for it to appear unless it must already exist
    async fn open(&mut self) -> Result<(), std::io::Error> {
        let mut announced = false;
        let file = loop {
            match File::open(&self.path) {
                Ok(file) => break file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && !self.options.must_exist => {
                    if !announced {
                        info!(path = %self.path.display(), "Waiting for file to be created");
                        announced = true;
                    }
                    sleep(self.options.poll_interval).await;
                }
                Err(e) => return Err(e),
            }
        };

        let metadata = file.metadata()?;
        self.file_inode = Some(get_inode(&metadata));
        self.file = Some(BufReader::new(file));
        self.current_offset = 0;
        self.pending.clear();

        Ok(())
    }

    /// Read the next complete line, without its line terminator.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than failing the
    /// read, so one corrupt line cannot stop the watcher.
    async fn next_line(&mut self) -> Result<Option<String>, std::io::Error> {
        loop {
            let Some(file) = self.file.as_mut() else {
                return Ok(None);
            };

            let bytes_read = file.read_until(b'\n', &mut self.pending)?;

            if bytes_read > 0 {
                self.current_offset += bytes_read as u64;

                if self.pending.ends_with(b"\n") {
                    return Ok(Some(self.take_pending()));
                }
                // Partial line: the rest may still be on its way
                continue;
            }

            if !self.options.follow {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_pending()));
            }

            if self.check_file_replaced()? {
                warn!(path = %self.path.display(), "File rotated or truncated, reopening");
                self.file = None;
                self.open().await?;
                continue;
            }

            sleep(self.options.poll_interval).await;
        }
    }

    fn take_pending(&mut self) -> String {
        let bytes = std::mem::take(&mut self.pending);
        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    line_number = self.line_number + 1,
                    "Line is not valid UTF-8, replacing invalid bytes"
                );
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        line.trim_end_matches(&['\n', '\r'][..]).to_string()
    }

    /// Check whether the path now names a different file or the file shrank
    fn check_file_replaced(&self) -> Result<bool, std::io::Error> {
        let Some(original_inode) = self.file_inode else {
            return Ok(false);
        };

        match std::fs::metadata(&self.path) {
            Ok(metadata) => {
                Ok(get_inode(&metadata) != original_inode || metadata.len() < self.current_offset)
            }
            // Removed and not recreated yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn get_inode(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn get_inode(metadata: &Metadata) -> u64 {
    // No inode outside unix; creation time is the closest stand-in
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    if let Ok(created) = metadata.created() {
        created.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::timestamp::LogFormat;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::time::timeout;

    fn fast_options(must_exist: bool, follow: bool) -> WatchOptions {
        WatchOptions {
            must_exist,
            follow,
            poll_interval: Duration::from_millis(10),
        }
    }

    async fn collect(watcher: FileWatcher) -> (Vec<Record>, Vec<WatchError>) {
        let (results_tx, mut results_rx) = mpsc::channel(64);
        let (errors_tx, mut errors_rx) = mpsc::channel(64);

        watcher.run(results_tx, errors_tx).await;

        let mut records = Vec::new();
        while let Some(record) = results_rx.recv().await {
            records.push(record);
        }
        let mut errors = Vec::new();
        while let Some(err) = errors_rx.recv().await {
            errors.push(err);
        }
        (records, errors)
    }

    #[tokio::test]
    async fn test_reads_existing_lines_in_order() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "2018-02-01T15:04:05Z | first").unwrap();
        writeln!(temp_file, "2018-02-01T15:04:06Z | second").unwrap();
        temp_file.flush().unwrap();

        let watcher = FileWatcher::new(
            temp_file.path().to_path_buf(),
            "second_format",
            fast_options(true, false),
        );
        let (records, errors) = collect(watcher).await;

        assert!(errors.is_empty());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "first");
        assert_eq!(records[1].message, "second");
        assert_eq!(records[0].source_file, temp_file.path());
        assert_eq!(records[0].format, LogFormat::SecondFormat);
    }

    #[tokio::test]
    async fn test_bad_lines_are_reported_and_skipped() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "2018-02-01T15:04:05Z | first").unwrap();
        writeln!(temp_file).unwrap();
        writeln!(temp_file, "INVALID LINE").unwrap();
        writeln!(temp_file, "2018-02-01T25:04:05Z | bad hour").unwrap();
        writeln!(temp_file, "2018-02-01T15:04:07Z | last").unwrap();
        temp_file.flush().unwrap();

        let watcher = FileWatcher::new(
            temp_file.path().to_path_buf(),
            "second_format",
            fast_options(true, false),
        );
        let (records, errors) = collect(watcher).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].message, "last");

        let line_numbers: Vec<u64> = errors
            .iter()
            .map(|e| match e {
                WatchError::Line { line_number, .. } => *line_number,
                other => panic!("unexpected error {:?}", other),
            })
            .collect();
        assert_eq!(line_numbers, vec![2, 3, 4]);
        assert!(matches!(
            errors[0],
            WatchError::Line {
                source: ParseError::MalformedLine { .. },
                ..
            }
        ));
        assert!(matches!(
            errors[2],
            WatchError::Line {
                source: ParseError::TimeParse(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_format_fails_every_line() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "2018-02-01T15:04:05Z | a").unwrap();
        writeln!(temp_file, "2018-02-01T15:04:06Z | b").unwrap();
        temp_file.flush().unwrap();

        let watcher = FileWatcher::new(
            temp_file.path().to_path_buf(),
            "bogus_format",
            fast_options(true, false),
        );
        let (records, errors) = collect(watcher).await;

        assert!(records.is_empty());
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(
            e,
            WatchError::Line {
                source: ParseError::UnsupportedFormat(_),
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_stop_watcher() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"2018-02-01T15:04:05Z | one\n2018-02-01T15:04:06Z | bad \xff\xfe bytes\n2018-02-01T15:04:07Z | three\n")
            .unwrap();
        temp_file.flush().unwrap();

        let watcher = FileWatcher::new(
            temp_file.path().to_path_buf(),
            "second_format",
            fast_options(true, false),
        );
        let (records, errors) = collect(watcher).await;

        assert!(errors.is_empty());
        let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "bad \u{FFFD}\u{FFFD} bytes", "three"]);
    }

    #[tokio::test]
    async fn test_missing_file_must_exist() {
        let dir = TempDir::new().unwrap();
        let watcher = FileWatcher::new(
            dir.path().join("absent.log"),
            "first_format",
            fast_options(true, false),
        );
        let (records, errors) = collect(watcher).await;

        assert!(records.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], WatchError::Setup { .. }));
    }

    #[tokio::test]
    async fn test_waits_for_file_creation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("later.log");

        let watcher = FileWatcher::new(path.clone(), "second_format", fast_options(false, false));
        let handle = tokio::spawn(collect(watcher));

        sleep(Duration::from_millis(50)).await;
        std::fs::write(&path, "2018-02-01T15:04:05Z | created\n").unwrap();

        let (records, errors) = timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(errors.is_empty());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "created");
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "2018-02-01T15:04:05Z | one\r\n2018-02-01T15:04:06Z | two").unwrap();
        temp_file.flush().unwrap();

        let watcher = FileWatcher::new(
            temp_file.path().to_path_buf(),
            "second_format",
            fast_options(true, false),
        );
        let (records, errors) = collect(watcher).await;

        assert!(errors.is_empty());
        let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_follow_picks_up_appended_lines() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "2018-02-01T15:04:05Z | existing").unwrap();
        temp_file.flush().unwrap();

        let (results_tx, mut results_rx) = mpsc::channel(8);
        let (errors_tx, _errors_rx) = mpsc::channel(8);
        let watcher = FileWatcher::new(
            temp_file.path().to_path_buf(),
            "second_format",
            fast_options(true, true),
        );
        let handle = tokio::spawn(watcher.run(results_tx, errors_tx));

        let first = timeout(Duration::from_secs(5), results_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.message, "existing");

        // Half a line first; it must not be emitted until completed
        write!(temp_file, "2018-02-01T15:04:06Z | app").unwrap();
        temp_file.flush().unwrap();
        sleep(Duration::from_millis(50)).await;
        assert!(results_rx.try_recv().is_err());

        writeln!(temp_file, "ended").unwrap();
        temp_file.flush().unwrap();

        let second = timeout(Duration::from_secs(5), results_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.message, "appended");

        // Following never finishes on its own
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_stops_when_consumer_is_gone() {
        let mut temp_file = NamedTempFile::new().unwrap();
        for i in 0..10 {
            writeln!(temp_file, "2018-02-01T15:04:{:02}Z | line {}", i, i).unwrap();
        }
        temp_file.flush().unwrap();

        let (results_tx, results_rx) = mpsc::channel(1);
        let (errors_tx, _errors_rx) = mpsc::channel(1);
        drop(results_rx);

        let watcher = FileWatcher::new(
            temp_file.path().to_path_buf(),
            "second_format",
            fast_options(true, true),
        );
        timeout(Duration::from_secs(5), watcher.run(results_tx, errors_tx))
            .await
            .unwrap();
    }
}
