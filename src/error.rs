use crate::batch::BatchStatus;
use crate::roles::Role;

#[derive(thiserror::Error, Debug)]
pub enum CustodyError {
    #[error("caller is not authorized for this operation")]
    NotAuthorized,
    #[error("target address lacks the {0:?} role required for the next custody stage")]
    NotAuthorizedRole(Role),
    #[error("system is paused by the administrator")]
    SystemPaused,
    #[error("batch {0} already exists")]
    DuplicateId(u64),
    #[error("batch {0} not found")]
    NotFound(u64),
    #[error("caller is not the current owner of batch {0}")]
    NotCurrentOwner(u64),
    #[error("transfer of batch {0} does not follow the fixed custody stage order")]
    InvalidStageTransition(u64),
    #[error("first transfer of batch {id} requires a stake of at least {required}")]
    MissingStake { id: u64, required: u64 },
    #[error("stake supplied on a non-claim transfer of batch {0}")]
    UnexpectedStake(u64),
    #[error("collateral already staked for batch {0}")]
    AlreadyStaked(u64),
    #[error("collateral already released for batch {0}")]
    AlreadyReleased(u64),
    #[error("operation not valid while batch {id} is {status:?}")]
    InvalidState { id: u64, status: BatchStatus },
    #[error("batch {0} has already been finalized")]
    BatchFinalized(u64),
    #[error("batch details failed validation: {0}")]
    InvalidDetails(String),
    #[error("ledger storage failure")]
    Storage(#[from] sled::Error),
    #[error("failed to decode ledger record")]
    Decode(#[from] minicbor::decode::Error),
    #[error("failed to encode ledger record")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
}
