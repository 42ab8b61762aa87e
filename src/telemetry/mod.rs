//! Telemetry: validated payloads, the HTTP endpoint, the durable backup queue
//! and the uploader that ties them together.

pub mod backup;
pub mod client;
pub mod payload;
pub mod uploader;

pub use backup::{BackupError, BackupQueue, BACKUP_HEADER};
pub use client::{
    parse_entry_id, Connectivity, SystemConnectivity, TelemetryEndpoint, TelemetryError,
    ThingSpeakClient,
};
pub use payload::{TelemetryPayload, TelemetryRecord};
pub use uploader::{FlushReport, RetryPolicy, TelemetryUploader, UploadOutcome};
