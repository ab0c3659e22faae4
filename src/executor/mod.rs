//! OrderExecutor: parameter preparation, classification and batched
//! submission (§4.4).

pub mod batch;
pub mod cancel;
pub mod classify;
pub mod order_executor;
pub mod params;

pub use batch::{BatchSubmitter, SubmitOutcome, FALLBACK_CONCURRENCY, NATIVE_BATCH_CHUNK_SIZE};
pub use cancel::{attempt_cancel, cancel_with_retry, AttemptError};
pub use classify::{classify as classify_failure, FailureKind};
pub use order_executor::{ExecutionOutcome, OrderExecutor};
pub use params::{validate_params, ParamError};
