use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::StorageError;

/// Source of snapshot timestamps. Injected so that stores never read
/// process-wide time implicitly.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// RFC 3339 rendering of the clock's current instant.
pub(crate) fn timestamp(clock: &dyn Clock) -> Result<String, StorageError> {
    clock
        .now()
        .format(&Rfc3339)
        .map_err(|e| StorageError::Backend(format!("timestamp formatting failed: {}", e)))
}
