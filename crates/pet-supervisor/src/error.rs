use pet_core::PidRecordError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("pid record error: {0}")]
    Record(#[from] PidRecordError),
}
