use thiserror::Error;

use crate::kv::KvError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("story id is required")]
    MissingIdentifier,
    #[error("store error: {0}")]
    Kv(#[from] KvError),
}
