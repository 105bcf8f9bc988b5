/// Failed request audit trail
///
/// Every error response produces one `AuditEntry` which is written through the
/// `AuditLog` store. A failing audit write is logged and otherwise ignored so
/// the client still receives its error envelope.

use std::backtrace::{Backtrace, BacktraceStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, RequestContext};
use crate::repository::AuditLog;

mod datetime_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ser.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deser: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deser)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub request_id: String,
    pub accessed_url_path: String,
    /// Message returned to the client
    pub message: String,
    /// HTTP status code
    pub code: u16,
    /// Source location that raised the error
    pub file: String,
    pub line: u32,
    /// Operation, full internal error chain and a backtrace when enabled
    pub trace: String,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Build an entry for `error`, recording where it was raised.
    pub fn capture(error: &AppError, context: &RequestContext) -> Self {
        let location = error.location();

        Self {
            request_id: context.request_id.clone(),
            accessed_url_path: context.path.clone(),
            message: error.public_message(),
            code: error.status_code().as_u16(),
            file: location.file().to_string(),
            line: location.line(),
            trace: build_trace(error, context),
            created_at: Utc::now(),
        }
    }
}

fn build_trace(error: &AppError, context: &RequestContext) -> String {
    let mut previous = error.to_string();
    let mut trace = format!("{}: {}", context.operation, previous);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        let message = cause.to_string();
        // Wrapper variants display their inner error verbatim
        if message != previous {
            trace.push_str(&format!("\n  caused by: {}", message));
        }
        previous = message;
        source = cause.source();
    }

    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        trace.push_str(&format!("\n{}", backtrace));
    }

    trace
}

/// Write `entry`. Failures are logged, never propagated.
pub async fn record(audit: &dyn AuditLog, entry: AuditEntry) {
    if let Err(e) = audit.add_log(&entry).await {
        tracing::error!(
            request_id = %entry.request_id,
            path = %entry.accessed_url_path,
            error = %e,
            "Failed to write audit log entry"
        );
    }
}
