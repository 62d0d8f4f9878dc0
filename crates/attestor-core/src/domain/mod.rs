//! Domain model (ids, task/claim records, proof, events, stages, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod proof;
pub mod state;
pub mod task;

pub use self::errors::{AttestorError, ErrorKind};
pub use self::events::{Candidate, CandidateSource, LedgerEvent};
pub use self::ids::{AttemptId, OperatorAddress, TaskId};
pub use self::proof::{AuditBlob, ProofPayload, Verdict, VerifiedFacts};
pub use self::state::PipelineStage;
pub use self::task::{AccessToken, ClaimRecord, TaskRecord, TaskStatus};
