pub mod counter;
pub mod election;
pub mod indexed_map;
pub mod list;
pub mod lock;
pub mod log;
pub mod map;
pub mod set;
pub mod value;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Outcome of a state-changing primitive operation, beyond the header-level
/// status the dispatch loop already consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpStatus {
    #[default]
    Ok,
    Noop,
    PreconditionFailed,
    WriteLock,
    OutOfBounds,
}

impl OpStatus {
    /// Maps a non-OK outcome onto the client error set; `Noop` passes.
    pub(crate) fn check(self) -> ClientResult<()> {
        match self {
            OpStatus::Ok | OpStatus::Noop => Ok(()),
            OpStatus::PreconditionFailed => Err(ClientError::InvalidArgument(
                "write condition failed".to_string(),
            )),
            OpStatus::WriteLock => Err(ClientError::InvalidArgument(
                "write lock failed".to_string(),
            )),
            OpStatus::OutOfBounds => Err(ClientError::InvalidArgument(
                "index out of range".to_string(),
            )),
        }
    }
}
