use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::{DeliveryError, dispatch::PushStatus};

/// One per-recipient record of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub dispatch_id: Uuid,
    pub platform: &'static str,
    pub status: PushStatus,
    pub token: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DeliveryError>,
}

/// Sink for per-recipient delivery records.
pub trait AuditLog: Send + Sync {
    fn append(&self, record: AuditRecord);

    /// Append all records of one dispatch. Implementations keep the batch
    /// contiguous and in order.
    fn append_batch(&self, records: Vec<AuditRecord>) {
        for record in records {
            self.append(record);
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }

    fn append_batch(&self, records: Vec<AuditRecord>) {
        self.records.lock().extend(records);
    }
}

/// Emits each record as a `tracing` event on the `pushcast::audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditLog {
    batch: Mutex<()>,
}

impl TracingAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLog for TracingAuditLog {
    fn append(&self, record: AuditRecord) {
        match &record.error {
            None => tracing::info!(
                target: "pushcast::audit",
                dispatch_id = %record.dispatch_id,
                platform = record.platform,
                status = record.status.as_str(),
                token = %record.token,
                request_message = %record.message,
                "push succeeded"
            ),
            Some(error) => tracing::warn!(
                target: "pushcast::audit",
                dispatch_id = %record.dispatch_id,
                platform = record.platform,
                status = record.status.as_str(),
                token = %record.token,
                request_message = %record.message,
                error = %error,
                error_code = error.code.as_deref().unwrap_or(""),
                "push failed"
            ),
        }
    }

    fn append_batch(&self, records: Vec<AuditRecord>) {
        let _guard = self.batch.lock();
        for record in records {
            self.append(record);
        }
    }
}
