//! Core domain types for the bed lifecycle engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Amount;
use crate::access::Actor;

/// Ward identifier.
pub type WardId = u32;
/// Room identifier.
pub type RoomId = u32;
/// Bed identifier.
pub type BedId = u32;
/// Patient identifier, assigned by the external identity service.
pub type PatientId = u32;
/// Admission identifier.
pub type AdmissionId = u32;
/// Transfer request identifier.
pub type TransferId = u32;
/// Bed rate row identifier.
pub type RateId = u32;

/// Availability classification of a bed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BedState {
    Vacant,
    Reserved,
    Preoccupied,
    Occupied,
}

impl BedState {
    pub fn label(&self) -> &'static str {
        match self {
            BedState::Vacant => "vacant",
            BedState::Reserved => "reserved",
            BedState::Preoccupied => "preoccupied",
            BedState::Occupied => "occupied",
        }
    }
}

impl fmt::Display for BedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
#[error("unrecognized bed state '{0}'")]
pub struct ParseBedStateError(String);

impl FromStr for BedState {
    type Err = ParseBedStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vacant" => Ok(BedState::Vacant),
            "reserved" => Ok(BedState::Reserved),
            "preoccupied" => Ok(BedState::Preoccupied),
            "occupied" => Ok(BedState::Occupied),
            other => Err(ParseBedStateError(other.to_string())),
        }
    }
}

/// Room category the rate table prices against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    General,
    Private,
    Icu,
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoomType::General => "general",
            RoomType::Private => "private",
            RoomType::Icu => "icu",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
#[error("unrecognized room type '{0}'")]
pub struct ParseRoomTypeError(String);

impl FromStr for RoomType {
    type Err = ParseRoomTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(RoomType::General),
            "private" => Ok(RoomType::Private),
            "icu" => Ok(RoomType::Icu),
            other => Err(ParseRoomTypeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ward {
    pub id: WardId,
    pub code: String,
    pub name: String,
    pub floor: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub ward_id: WardId,
    pub number: String,
    pub room_type: RoomType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bed {
    pub id: BedId,
    pub room_id: RoomId,
    pub code: String,
    pub state: BedState,
    pub reserved_until: Option<DateTime<Utc>>,
    pub note: Option<String>,
    /// Soft-disable flag; an inactive bed is never claimable but stays
    /// listable and referenced by history.
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionStatus {
    Admitted,
    Discharged,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayorKind {
    SelfPay,
    Insurance,
    Government,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payor {
    pub kind: PayorKind,
    pub reference: Option<String>,
}

/// A patient's current inpatient stay, bound to exactly one bed at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    pub id: AdmissionId,
    pub patient_id: PatientId,
    pub current_bed_id: BedId,
    pub status: AdmissionStatus,
    pub admitted_at: DateTime<Utc>,
    pub discharged_at: Option<DateTime<Utc>>,
    pub expected_discharge_at: Option<DateTime<Utc>>,
    pub attending_practitioner: Option<String>,
    pub diagnosis: Option<String>,
    pub payor: Option<Payor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferType {
    Clinical,
    Operational,
    PatientRequest,
}

#[derive(Debug, Error)]
#[error("unrecognized transfer type '{0}'")]
pub struct ParseTransferTypeError(String);

impl FromStr for TransferType {
    type Err = ParseTransferTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clinical" => Ok(TransferType::Clinical),
            "operational" => Ok(TransferType::Operational),
            "patient-request" => Ok(TransferType::PatientRequest),
            other => Err(ParseTransferTypeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferPriority {
    Routine,
    Urgent,
    Emergency,
}

#[derive(Debug, Error)]
#[error("unrecognized priority '{0}'")]
pub struct ParsePriorityError(String);

impl FromStr for TransferPriority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "routine" => Ok(TransferPriority::Routine),
            "urgent" => Ok(TransferPriority::Urgent),
            "emergency" => Ok(TransferPriority::Emergency),
            other => Err(ParsePriorityError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Requested,
    Approved,
    Rejected,
    Scheduled,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Rejected | TransferStatus::Completed | TransferStatus::Cancelled
        )
    }
}

/// Audited transition on a transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferAction {
    Requested,
    Approved,
    Rejected,
    BedAssigned,
    Scheduled,
    Completed,
    Cancelled,
    ReservationReleased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub action: TransferAction,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub label: String,
    pub done: bool,
}

/// Handover checklist captured when a transfer completes, kept for audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverChecklist {
    pub items: Vec<ChecklistItem>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub id: TransferId,
    pub admission_id: AdmissionId,
    pub transfer_type: TransferType,
    pub priority: TransferPriority,
    pub status: TransferStatus,
    pub from_bed_id: BedId,
    pub to_bed_id: Option<BedId>,
    pub reserve_minutes: u32,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub reason: String,
    pub request_note: Option<String>,
    pub approval_note: Option<String>,
    pub rejected_reason: Option<String>,
    pub cancel_reason: Option<String>,
    pub handover: Option<HandoverChecklist>,
    /// Actor and timestamp of every transition; entries are never removed.
    pub audit: Vec<AuditEntry>,
}

/// Daily price for a room type over an effective date window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedRate {
    pub id: RateId,
    pub room_type: RoomType,
    pub daily_rate: Amount,
    pub effective_from: NaiveDate,
    /// Open-ended when `None`.
    pub effective_to: Option<NaiveDate>,
}

// Create/patch payloads: required fields on create, all-optional on patch.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWard {
    pub code: String,
    pub name: String,
    pub floor: i16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardPatch {
    pub code: Option<String>,
    pub name: Option<String>,
    pub floor: Option<i16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoom {
    pub ward_id: WardId,
    pub number: String,
    pub room_type: RoomType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomPatch {
    pub number: Option<String>,
    pub room_type: Option<RoomType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBed {
    pub room_id: RoomId,
    pub code: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BedPatch {
    pub code: Option<String>,
    pub note: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBedRate {
    pub room_type: RoomType,
    pub daily_rate: Amount,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAdmission {
    pub patient_id: PatientId,
    pub bed_id: BedId,
    pub admitted_at: Option<DateTime<Utc>>,
    pub expected_discharge_at: Option<DateTime<Utc>>,
    pub attending_practitioner: Option<String>,
    pub diagnosis: Option<String>,
    pub payor: Option<Payor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionPatch {
    pub expected_discharge_at: Option<DateTime<Utc>>,
    pub attending_practitioner: Option<String>,
    pub diagnosis: Option<String>,
    pub payor: Option<Payor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransfer {
    pub admission_id: AdmissionId,
    pub transfer_type: TransferType,
    pub priority: TransferPriority,
    pub reason: String,
    pub request_note: Option<String>,
    pub to_bed_id: Option<BedId>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub reserve_minutes: u32,
}

/// One priced calendar day of a charge preview.
#[derive(Debug, Clone, Serialize)]
pub struct ChargeDay {
    pub date: NaiveDate,
    pub room_type: RoomType,
    pub bed_id: BedId,
    pub rate: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChargePreview {
    pub admission_id: AdmissionId,
    pub days: Vec<ChargeDay>,
    pub total_amount: Amount,
    pub missing_rate_days: u32,
}

/// A workflow request, the engine's transport-agnostic input.
///
/// Inventory CRUD is direct API; commands cover the admission and transfer
/// workflow plus manual bed overrides, which is what a replayed event log
/// contains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    Admit {
        actor: Actor,
        patient: PatientId,
        bed: BedId,
        admitted_at: Option<DateTime<Utc>>,
    },
    CancelAdmission {
        actor: Actor,
        admission: AdmissionId,
    },
    Discharge {
        actor: Actor,
        admission: AdmissionId,
        discharged_at: Option<DateTime<Utc>>,
    },
    RequestTransfer {
        actor: Actor,
        admission: AdmissionId,
        transfer_type: TransferType,
        priority: TransferPriority,
        reason: String,
        to_bed: Option<BedId>,
        scheduled_at: Option<DateTime<Utc>>,
        reserve_minutes: u32,
    },
    ApproveTransfer {
        actor: Actor,
        transfer: TransferId,
        approve: bool,
        note: Option<String>,
        rejected_reason: Option<String>,
    },
    AssignTransferBed {
        actor: Actor,
        transfer: TransferId,
        bed: BedId,
        scheduled_at: Option<DateTime<Utc>>,
        reserve_minutes: u32,
    },
    CompleteTransfer {
        actor: Actor,
        transfer: TransferId,
        vacated_at: Option<DateTime<Utc>>,
        occupied_at: Option<DateTime<Utc>>,
        handover: Option<HandoverChecklist>,
    },
    CancelTransfer {
        actor: Actor,
        transfer: TransferId,
        reason: String,
    },
    SetBedState {
        actor: Actor,
        bed: BedId,
        state: BedState,
        reserved_until: Option<DateTime<Utc>>,
        note: Option<String>,
    },
}

#[derive(Debug, Error)]
#[error("malformed timestamp '{0}'")]
pub struct ParseTimestampError(String);

/// Parse an absolute timestamp, normalizing to whole seconds.
///
/// Accepts RFC 3339 and the minute-precision forms `YYYY-MM-DDTHH:MM` /
/// `YYYY-MM-DDTHH:MM:SS`, with or without a trailing `Z`.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ParseTimestampError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc).trunc_subsecs(0));
    }
    let naive = s.strip_suffix('Z').unwrap_or(s);
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(naive, format) {
            return Ok(t.and_utc());
        }
    }
    Err(ParseTimestampError(s.to_string()))
}

/// Truncate an already-parsed timestamp to whole seconds.
pub fn normalize_timestamp(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(0)
}
