//! Reflog entry types.

/// Identity recorded when the caller of a ref mutation supplies none.
pub const DEFAULT_COMMITTER: &[u8] = b"gitvault <gitvault@localhost>";

/// One appended row of reference history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogEntry {
    pub id: i64,
    pub ref_name: Vec<u8>,
    /// Previous ref value; the 40-zero hex id when the ref was created.
    pub old: Vec<u8>,
    /// New ref value; the 40-zero hex id when the ref was deleted.
    pub new: Vec<u8>,
    pub committer: Vec<u8>,
    /// Unix timestamp of the mutation.
    pub timestamp: i64,
    /// Timezone offset in seconds.
    pub timezone: i32,
    pub message: Vec<u8>,
}

/// Caller-supplied context for a reflog append. Fields left unset fall back
/// to [`DEFAULT_COMMITTER`], the current time, offset zero, and an empty
/// message.
#[derive(Debug, Clone, Default)]
pub struct ReflogInfo {
    pub committer: Option<Vec<u8>>,
    pub timestamp: Option<i64>,
    pub timezone: i32,
    pub message: Vec<u8>,
}

impl ReflogInfo {
    pub fn with_message(message: impl Into<Vec<u8>>) -> Self {
        ReflogInfo {
            message: message.into(),
            ..Default::default()
        }
    }
}
