//! Append-only CSV event store.
//!
//! Columns are `email,tracking_id,event,time` with a header row written when
//! the file is created. Rows are only ever appended. Appends and reads are
//! serialized through one async lock so concurrent ingress requests never
//! interleave partial rows.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::tracking::event::{EventKind, TrackingEvent};

/// Column names, in file order.
pub const HEADER: [&str; 4] = ["email", "tracking_id", "event", "time"];

#[derive(Debug)]
pub struct EventStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one event stamped now. Storage failures are logged and
    /// swallowed; the caller's response must not depend on them.
    pub async fn record(&self, email: &str, tracking_id: &str, kind: EventKind) {
        let event = TrackingEvent::now(email, tracking_id, kind);

        match self.append(&event).await {
            Ok(()) => info!(
                email = %event.email,
                tracking_id = %event.tracking_id,
                event = %event.kind,
                time = %event.time,
                "tracking_event_recorded"
            ),
            Err(e) => error!(
                email = %event.email,
                tracking_id = %event.tracking_id,
                event = %event.kind,
                path = %self.path.display(),
                error = %e,
                "tracking_event_write_failed"
            ),
        }
    }

    /// Append one row, creating the file with its header if needed.
    pub async fn append(&self, event: &TrackingEvent) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;

        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let needs_header = len == 0;

        // A crash mid-write can leave an unterminated last row; close it off
        // so the new row starts on its own line.
        let mut bytes = Vec::new();
        if len > 0 && !self.ends_with_newline(len).await? {
            bytes.push(b'\n');
        }

        let mut writer = csv::Writer::from_writer(bytes);
        if needs_header {
            writer.write_record(HEADER)?;
        }
        writer.write_record([
            event.email.as_str(),
            event.tracking_id.as_str(),
            event.kind.as_str(),
            event.time.as_str(),
        ])?;
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok(())
    }

    async fn ends_with_newline(&self, len: u64) -> Result<bool, StoreError> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(len - 1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;
        Ok(last[0] == b'\n')
    }

    /// Every well-formed event, in store order. A missing store is empty.
    pub async fn list_events(&self) -> Result<Vec<TrackingEvent>, StoreError> {
        let data = {
            let _guard = self.lock.lock().await;
            match tokio::fs::read(&self.path).await {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
        };

        Ok(parse_events(&data))
    }
}

/// Parse store contents, skipping rows that do not yield a complete event.
pub fn parse_events(data: &[u8]) -> Vec<TrackingEvent> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            debug!(error = %e, "tracking_header_unreadable");
            return Vec::new();
        }
    };
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let (email, tracking_id, kind, time) = (
        column("email"),
        column("tracking_id"),
        column("event"),
        column("time"),
    );

    let mut events = Vec::new();
    let mut skipped = 0usize;

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(error = %e, "tracking_row_unreadable");
                skipped += 1;
                continue;
            }
        };

        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i));
        match TrackingEvent::from_fields(field(email), field(tracking_id), field(kind), field(time)) {
            Some(event) => events.push(event),
            None => {
                debug!(position = ?record.position().map(|p| p.line()), "tracking_row_malformed");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        debug!(kept = events.len(), skipped = skipped, "tracking_rows_filtered");
    }
    events
}
