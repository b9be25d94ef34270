use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Creation and last-write timestamps carried by every row.
///
/// Both columns are owned by the database: inserts take `now()` and the
/// `touch_updated_at` trigger refreshes `updated_at` on every UPDATE, always
/// moving it forward by at least one microsecond. Rust code never writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Audit {
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Audit {
    pub fn is_consistent(&self) -> bool {
        self.updated_at >= self.created_at
    }

    /// True when `later` is a strictly newer revision of the same row.
    pub fn precedes(&self, later: &Audit) -> bool {
        self.created_at == later.created_at && later.updated_at > self.updated_at
    }
}
