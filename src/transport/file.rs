//! File-backed transport.
//!
//! The source partition is a newline-delimited file; the offset of a record
//! is its zero-based line number. Forwarded records are appended to the
//! destination file. The committed offset (next line to read) lives in a
//! sidecar file so a restarted relay resumes where it left off.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::config::FileTransportConfig;
use crate::transport::{Ack, PartitionId, Record, Transport, TransportError, TransportResult};

struct SourceReader {
    reader: BufReader<File>,
    next_offset: i64,
    /// Bytes of a line whose terminating newline has not been written yet.
    partial: Vec<u8>,
}

impl SourceReader {
    async fn next_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let read = self.reader.read_until(b'\n', &mut self.partial).await?;
        if read == 0 || !self.partial.ends_with(b"\n") {
            return Ok(None);
        }

        let mut line = std::mem::take(&mut self.partial);
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

/// Relays between two local files.
pub struct FileTransport {
    partition: PartitionId,
    offset_path: PathBuf,
    source: Mutex<SourceReader>,
    destination: Mutex<File>,
    committed: AtomicI64,
    paused: AtomicBool,
}

fn io_error(context: &str, path: &Path, err: std::io::Error) -> TransportError {
    TransportError::network(format!("{} {}: {}", context, path.display(), err))
}

/// Sidecar path used when no explicit offset file is configured.
pub fn default_offset_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".offset");
    PathBuf::from(name)
}

async fn read_committed(path: &Path) -> TransportResult<i64> {
    match fs::read_to_string(path).await {
        Ok(content) => content.trim().parse::<i64>().map_err(|e| {
            TransportError::application(format!(
                "corrupt offset file {}: {}",
                path.display(),
                e
            ))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(io_error("failed to read offset file", path, e)),
    }
}

impl FileTransport {
    /// Open the source (skipping already committed lines) and the destination.
    pub async fn open(config: &FileTransportConfig) -> TransportResult<Self> {
        let source_path = PathBuf::from(&config.source_path);
        let destination_path = PathBuf::from(&config.destination_path);
        let offset_path = config
            .offset_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_offset_path(&source_path));

        let committed = read_committed(&offset_path).await?;

        let file = File::open(&source_path)
            .await
            .map_err(|e| io_error("failed to open source", &source_path, e))?;
        let mut source = SourceReader {
            reader: BufReader::new(file),
            next_offset: 0,
            partial: Vec::new(),
        };
        while source.next_offset < committed {
            let line = source
                .next_line()
                .await
                .map_err(|e| io_error("failed to read source", &source_path, e))?;
            if line.is_none() {
                tracing::warn!(
                    committed,
                    available = source.next_offset,
                    path = %source_path.display(),
                    "Committed offset is past the end of the source file"
                );
                break;
            }
            source.next_offset += 1;
        }

        let destination = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&destination_path)
            .await
            .map_err(|e| io_error("failed to open destination", &destination_path, e))?;

        tracing::info!(
            source = %source_path.display(),
            destination = %destination_path.display(),
            resume_offset = source.next_offset,
            "File transport opened"
        );

        Ok(Self {
            partition: PartitionId::new(source_path.display().to_string(), 0),
            offset_path,
            source: Mutex::new(source),
            destination: Mutex::new(destination),
            committed: AtomicI64::new(committed),
            paused: AtomicBool::new(false),
        })
    }

    /// Next offset that will be read after a restart.
    pub fn committed(&self) -> i64 {
        self.committed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn receive(&self, timeout: Duration) -> TransportResult<Option<Record>> {
        if !self.paused.load(Ordering::Acquire) {
            let mut source = self.source.lock().await;
            let line = source.next_line().await.map_err(|e| {
                TransportError::network(format!("failed to read {}: {}", self.partition.topic, e))
            })?;
            if let Some(value) = line {
                let offset = source.next_offset;
                source.next_offset += 1;
                return Ok(Some(Record::new(self.partition.clone(), offset, None, value)));
            }
        }

        tokio::time::sleep(timeout).await;
        Ok(None)
    }

    async fn send(&self, record: &Record) -> TransportResult<Ack> {
        if record.value().contains(&b'\n') {
            return Err(TransportError::application(format!(
                "record at offset {} contains a line break",
                record.offset()
            )));
        }

        let mut line = Vec::with_capacity(record.value().len() + 1);
        line.extend_from_slice(record.value());
        line.push(b'\n');

        let mut destination = self.destination.lock().await;
        destination
            .write_all(&line)
            .await
            .map_err(|e| TransportError::network(format!("failed to append record: {}", e)))?;
        destination
            .sync_data()
            .await
            .map_err(|e| TransportError::network(format!("failed to sync destination: {}", e)))?;

        Ok(Ack {
            destination_offset: None,
        })
    }

    async fn commit(&self, record: &Record) -> TransportResult<()> {
        let next = record.offset() + 1;
        if next <= self.committed.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut tmp = self.offset_path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, next.to_string())
            .await
            .map_err(|e| io_error("failed to write offset file", &tmp, e))?;
        fs::rename(&tmp, &self.offset_path)
            .await
            .map_err(|e| io_error("failed to replace offset file", &self.offset_path, e))?;

        self.committed.fetch_max(next, Ordering::AcqRel);
        Ok(())
    }

    async fn pause_intake(&self) -> TransportResult<()> {
        self.paused.store(true, Ordering::Release);
        Ok(())
    }

    async fn resume_intake(&self) -> TransportResult<()> {
        self.paused.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ErrorKind;

    fn config_in(dir: &Path) -> FileTransportConfig {
        FileTransportConfig {
            source_path: dir.join("in.log").display().to_string(),
            destination_path: dir.join("out.log").display().to_string(),
            offset_path: None,
        }
    }

    #[tokio::test]
    async fn test_forward_and_resume_from_commit() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::write(&config.source_path, "one\ntwo\r\nthree\n").unwrap();

        let transport = FileTransport::open(&config).await.unwrap();
        let one = transport.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!((one.offset(), one.value()), (0, b"one".as_slice()));
        transport.send(&one).await.unwrap();
        transport.commit(&one).await.unwrap();

        let two = transport.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(two.value(), b"two");
        drop(transport);

        let reopened = FileTransport::open(&config).await.unwrap();
        assert_eq!(reopened.committed(), 1);
        let again = reopened.receive(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!((again.offset(), again.value()), (1, b"two".as_slice()));

        let written = std::fs::read_to_string(&config.destination_path).unwrap();
        assert_eq!(written, "one\n");
        let offset = std::fs::read_to_string(default_offset_path(Path::new(&config.source_path))).unwrap();
        assert_eq!(offset, "1");
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::write(&config.source_path, "par").unwrap();

        let transport = FileTransport::open(&config).await.unwrap();
        assert!(transport.receive(Duration::from_millis(1)).await.unwrap().is_none());

        let mut file = std::fs::OpenOptions::new().append(true).open(&config.source_path).unwrap();
        std::io::Write::write_all(&mut file, b"tial\n").unwrap();

        let record = transport.receive(Duration::from_millis(1)).await.unwrap().unwrap();
        assert_eq!(record.value(), b"partial");
    }

    #[tokio::test]
    async fn test_line_break_is_application_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::write(&config.source_path, "").unwrap();

        let transport = FileTransport::open(&config).await.unwrap();
        let record = Record::new(PartitionId::new("in", 0), 0, None, b"a\nb".to_vec());
        let err = transport.send(&record).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Application);
    }

    #[tokio::test]
    async fn test_paused_receive_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::write(&config.source_path, "one\n").unwrap();

        let transport = FileTransport::open(&config).await.unwrap();
        transport.pause_intake().await.unwrap();
        assert!(transport.receive(Duration::from_millis(1)).await.unwrap().is_none());
        transport.resume_intake().await.unwrap();
        assert!(transport.receive(Duration::from_millis(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        assert!(FileTransport::open(&config).await.is_err());
    }
}
