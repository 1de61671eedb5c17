use std::sync::Arc;

/// Errors from RBAC resolution.
///
/// Cloneable so one in-flight fetch can hand the same outcome to every
/// waiting caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RbacError {
    /// The manager failed. This is fatal to the request.
    #[error("rbac manager error: {0}")]
    Manager(Arc<dyn std::error::Error + Send + Sync>),

    #[error("invalid permission encoding: {0}")]
    InvalidPermission(String),

    #[error("cannot marshal an absent permission")]
    AbsentPermission,
}

impl RbacError {
    pub(crate) fn manager(e: crate::error::BoxError) -> Self {
        Self::Manager(Arc::from(e))
    }
}
