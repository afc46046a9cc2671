//! Error taxonomy for engine operations.
//!
//! Five classes, each its own enum folded into [`EngineError`]:
//! validation (rejected before any state change), conflict (resource
//! contention, carries enough context to retry against a different target),
//! precondition (workflow-order violation), forbidden (capability missing),
//! not-found.

use thiserror::Error;

use crate::access::Capability;
use crate::model::{
    AdmissionId, AdmissionStatus, BedId, BedState, PatientId, RoomId, TransferId, TransferStatus,
    WardId,
};

/// Top-level error returned by every engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionFailed),

    #[error("{0}")]
    Forbidden(#[from] Forbidden),

    #[error("not found: {0}")]
    NotFound(#[from] NotFound),
}

/// Malformed input, rejected before any state change.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{0} must be a positive id")]
    ZeroId(&'static str),

    #[error("reserve_minutes must be positive")]
    NonPositiveReserve,

    #[error("{field} must not precede {anchor}")]
    OutOfOrderTimestamp {
        field: &'static str,
        anchor: &'static str,
    },

    #[error("daily_rate must not be negative")]
    NegativeRate,

    #[error("effective_to precedes effective_from")]
    InvertedRateWindow,

    #[error("manual override cannot set state '{0}'")]
    UnsupportedManualState(BedState),

    #[error("reserved_until is required when reserving")]
    MissingReservedUntil,
}

/// Resource contention; the caller may retry against a different target.
#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("bed {bed} unavailable: expected {expected}, found {actual}")]
    BedUnavailable {
        bed: BedId,
        expected: BedState,
        actual: BedState,
    },

    #[error("bed {0} is disabled")]
    BedDisabled(BedId),

    #[error("patient {patient} already admitted (admission {admission})")]
    PatientAlreadyAdmitted {
        patient: PatientId,
        admission: AdmissionId,
    },

    #[error("bed {bed} is occupied by admission {admission}")]
    BedOccupied { bed: BedId, admission: AdmissionId },

    #[error("transfer {transfer} is in flight for admission {admission}")]
    TransferInFlight {
        admission: AdmissionId,
        transfer: TransferId,
    },

    #[error("{kind} {id} is still referenced")]
    Referenced { kind: &'static str, id: u32 },
}

/// Workflow-order violation, distinct from resource contention.
#[derive(Debug, Error)]
pub enum PreconditionFailed {
    #[error("transfer {0} has no target bed; assign one first")]
    NoTargetBed(TransferId),

    #[error("transfer {transfer} is {status}, expected {expected}")]
    TransferStatus {
        transfer: TransferId,
        status: TransferStatusLabel,
        expected: &'static str,
    },

    #[error("admission {admission} is {status}")]
    AdmissionStatus {
        admission: AdmissionId,
        status: AdmissionStatusLabel,
    },
}

/// Display helper so precondition messages read as workflow states.
#[derive(Debug, Clone, Copy)]
pub struct TransferStatusLabel(pub TransferStatus);

impl std::fmt::Display for TransferStatusLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.0 {
            TransferStatus::Requested => "requested",
            TransferStatus::Approved => "approved",
            TransferStatus::Rejected => "rejected",
            TransferStatus::Scheduled => "scheduled",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AdmissionStatusLabel(pub AdmissionStatus);

impl std::fmt::Display for AdmissionStatusLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.0 {
            AdmissionStatus::Admitted => "admitted",
            AdmissionStatus::Discharged => "discharged",
            AdmissionStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// The actor lacks the capability gating the operation; no state changed.
#[derive(Debug, Error)]
#[error("actor '{actor}' lacks capability '{capability}'")]
pub struct Forbidden {
    pub actor: String,
    pub capability: Capability,
}

#[derive(Debug, Error)]
pub enum NotFound {
    #[error("ward {0}")]
    Ward(WardId),

    #[error("room {0}")]
    Room(RoomId),

    #[error("bed {0}")]
    Bed(BedId),

    #[error("patient {0}")]
    Patient(PatientId),

    #[error("admission {0}")]
    Admission(AdmissionId),

    #[error("transfer {0}")]
    Transfer(TransferId),
}
