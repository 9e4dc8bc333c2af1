pub mod batch;
pub mod comp;
pub mod config;
pub mod domain;
pub mod errors;

pub use batch::{
    parse_ids, recompute_batch, recompute_one, BatchError, BatchMode, BatchStage, CompUpdate,
    RecomputeOutcome, RecomputeStatus, WonServiceSnapshot, WonServiceStore,
};
pub use comp::{
    calculate, rates::commission_rate, CompBreakdown, CompensationEngine,
    DeterministicCompensationEngine,
};
pub use domain::won_service::{RevenueType, WonService, WonServiceId, EARLY_RENEWAL};
pub use errors::{ApplicationError, DomainError, InterfaceError};
