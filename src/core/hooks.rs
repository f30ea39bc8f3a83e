use serde::Serialize;
use crate::core::error::Result;
use crate::schema::schema::Schema;

/// Reported when a commit leaves the store above `Config::max_store_rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeLimitInfo {
    pub rows: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLimitAction {
    /// Roll the commit back with `Error::SizeLimitExceeded`.
    Reject,
    Allow,
}

/// Caller-supplied extension points, fixed at construction.
pub trait EngineHooks: Send + Sync {
    /// Runs once before the reference catalog is built. An error aborts opening.
    fn before_init(&self, _schema: &Schema) -> Result<()> {
        Ok(())
    }

    fn size_limit_exceeded(&self, _info: &SizeLimitInfo) -> SizeLimitAction {
        SizeLimitAction::Reject
    }
}

/// Default hooks: accept every schema, reject commits over the size limit.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl EngineHooks for NoHooks {}
