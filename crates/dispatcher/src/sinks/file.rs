//! FileSink - appends deliveries as JSON lines

use chrono::{SecondsFormat, Utc};
use contracts::{Delivery, EventSink, RelayError};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, instrument};

use super::DeliveryRecord;

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file (created if missing, always appended)
    pub path: PathBuf,
    /// Flush after every line instead of on `flush`/`close`
    pub flush_each: bool,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> std::io::Result<Self> {
        let path = params.get("path").map(PathBuf::from).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing 'path' parameter")
        })?;
        let flush_each = params
            .get("flush_each")
            .map(|v| v == "true")
            .unwrap_or(false);

        Ok(Self { path, flush_each })
    }
}

#[derive(Serialize)]
struct Line<'a> {
    timestamp: String,
    #[serde(flatten)]
    record: DeliveryRecord<'a>,
}

/// Sink that appends one JSON object per delivery
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
    lines: u64,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            config,
            writer: Some(BufWriter::new(file)),
            lines: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params)?;
        Self::new(name, config)
    }

    fn write_line(&mut self, delivery: &Delivery) -> std::io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("file sink closed"))?;

        let line = Line {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            record: DeliveryRecord::from(delivery),
        };
        serde_json::to_writer(&mut *writer, &line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")?;
        if self.config.flush_each {
            writer.flush()?;
        }
        self.lines += 1;
        Ok(())
    }
}

impl EventSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, delivery),
        fields(sink = %self.name, sequence = delivery.sequence)
    )]
    async fn write(&mut self, delivery: &Delivery) -> Result<(), RelayError> {
        self.write_line(delivery)
            .map_err(|e| RelayError::sink_delivery(delivery.destination.as_str(), e.to_string()))
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), RelayError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), RelayError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        debug!(sink = %self.name, lines = self.lines, path = %self.config.path.display(), "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Message, OscArg};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn delivery(sequence: u64, address: &str) -> Delivery {
        Delivery {
            destination: "A".into(),
            sequence,
            message: Arc::new(Message::new(address, vec![OscArg::Float(0.5)])),
        }
    }

    #[tokio::test]
    async fn test_file_sink_appends_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.jsonl");
        let config = FileSinkConfig {
            path: path.clone(),
            flush_each: false,
        };

        let mut sink = FileSink::new("test_file", config.clone()).unwrap();
        sink.write(&delivery(1, "/a")).await.unwrap();
        sink.write(&delivery(2, "/b")).await.unwrap();
        sink.close().await.unwrap();

        // Reopening appends instead of truncating
        let mut sink = FileSink::new("test_file", config).unwrap();
        sink.write(&delivery(3, "/c")).await.unwrap();
        sink.close().await.unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["address"], "/a");
        assert_eq!(lines[2]["sequence"], 3);
        assert!(lines[0]["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = tempdir().unwrap();
        let params = HashMap::from([(
            "path".to_string(),
            dir.path().join("x.jsonl").display().to_string(),
        )]);
        let mut sink = FileSink::from_params("f", &params).unwrap();
        sink.close().await.unwrap();
        assert!(sink.write(&delivery(1, "/a")).await.is_err());
    }

    #[test]
    fn test_missing_path_param() {
        assert!(FileSinkConfig::from_params(&HashMap::new()).is_err());
    }
}
