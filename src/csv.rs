//! CSV ingest and output for the replay binary.
//!
//! A fixture directory holds the seed files (`wards.csv`, `rooms.csv`,
//! `beds.csv`, `rates.csv`, `patients.csv`) and a `commands.csv` event log.
//! Ids are assigned in file order, so rows reference wards/rooms/beds by
//! their 1-based position.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::access::{Actor, Patient};
use crate::model::{
    AdmissionId, BedId, BedState, Command, NewBed, NewBedRate, NewRoom, NewWard, PatientId, RoomId,
    TransferId, WardId, parse_timestamp,
};
use crate::Amount;

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized op '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: missing column '{column}'")]
    MissingColumn { line: usize, column: &'static str },

    #[error("line {line}: bad value '{value}' in column '{column}'")]
    BadValue {
        line: usize,
        column: &'static str,
        value: String,
    },
}

fn reader(path: impl AsRef<Path>) -> csv::Reader<std::fs::File> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file")
}

fn required<T>(value: Option<T>, line: usize, column: &'static str) -> Result<T, CsvError> {
    value.ok_or(CsvError::MissingColumn { line, column })
}

fn parsed<T: std::str::FromStr>(
    value: &str,
    line: usize,
    column: &'static str,
) -> Result<T, CsvError> {
    value.parse().map_err(|_| CsvError::BadValue {
        line,
        column,
        value: value.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct WardRow {
    code: String,
    name: String,
    floor: i16,
}

/// Read ward seeds from a csv file
pub fn read_wards(path: impl AsRef<Path>) -> impl Iterator<Item = Result<NewWard, CsvError>> {
    reader(path)
        .into_deserialize::<WardRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            Ok(NewWard {
                code: row.code,
                name: row.name,
                floor: row.floor,
            })
        })
}

#[derive(Debug, Deserialize)]
struct RoomRow {
    ward: WardId,
    number: String,
    r#type: String,
}

/// Read room seeds from a csv file
pub fn read_rooms(path: impl AsRef<Path>) -> impl Iterator<Item = Result<NewRoom, CsvError>> {
    reader(path)
        .into_deserialize::<RoomRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2;
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            Ok(NewRoom {
                ward_id: row.ward,
                number: row.number,
                room_type: parsed(&row.r#type, line, "type")?,
            })
        })
}

#[derive(Debug, Deserialize)]
struct BedRow {
    room: RoomId,
    code: String,
    note: Option<String>,
}

/// Read bed seeds from a csv file
pub fn read_beds(path: impl AsRef<Path>) -> impl Iterator<Item = Result<NewBed, CsvError>> {
    reader(path)
        .into_deserialize::<BedRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2;
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            Ok(NewBed {
                room_id: row.room,
                code: row.code,
                note: row.note,
            })
        })
}

#[derive(Debug, Deserialize)]
struct RateRow {
    room_type: String,
    daily_rate: f64,
    from: String,
    to: Option<String>,
}

/// Read the bed-rate table from a csv file
pub fn read_rates(path: impl AsRef<Path>) -> impl Iterator<Item = Result<NewBedRate, CsvError>> {
    reader(path)
        .into_deserialize::<RateRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2;
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let effective_to = match row.to.as_deref() {
                Some(to) if !to.is_empty() => Some(parsed(to, line, "to")?),
                _ => None,
            };
            Ok(NewBedRate {
                room_type: parsed(&row.room_type, line, "room_type")?,
                daily_rate: Amount::from_float(row.daily_rate),
                effective_from: parsed(&row.from, line, "from")?,
                effective_to,
            })
        })
}

#[derive(Debug, Deserialize)]
struct PatientRow {
    id: PatientId,
    name: String,
}

/// Read the patient directory seed from a csv file
pub fn read_patients(path: impl AsRef<Path>) -> impl Iterator<Item = Result<Patient, CsvError>> {
    reader(path)
        .into_deserialize::<PatientRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2;
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            Ok(Patient {
                id: row.id,
                name: row.name,
            })
        })
}

#[derive(Debug, Deserialize)]
struct CommandRow {
    op: String,
    actor: String,
    patient: Option<PatientId>,
    admission: Option<AdmissionId>,
    transfer: Option<TransferId>,
    bed: Option<BedId>,
    at: Option<String>,
    minutes: Option<u32>,
    kind: Option<String>,
    priority: Option<String>,
    approve: Option<bool>,
    reason: Option<String>,
}

impl CommandRow {
    fn timestamp(&self, line: usize) -> Result<Option<chrono::DateTime<chrono::Utc>>, CsvError> {
        match self.at.as_deref() {
            Some(at) if !at.is_empty() => {
                let t = parse_timestamp(at).map_err(|_| CsvError::BadValue {
                    line,
                    column: "at",
                    value: at.to_string(),
                })?;
                Ok(Some(t))
            }
            _ => Ok(None),
        }
    }
}

const DEFAULT_RESERVE_MINUTES: u32 = 30;

/// Read workflow commands from a csv event log
pub fn read_commands(path: impl AsRef<Path>) -> impl Iterator<Item = Result<Command, CsvError>> {
    reader(path)
        .into_deserialize::<CommandRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2;
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let actor = Actor::new(row.actor.clone());
            match row.op.as_str() {
                "admit" => Ok(Command::Admit {
                    actor,
                    patient: required(row.patient, line, "patient")?,
                    bed: required(row.bed, line, "bed")?,
                    admitted_at: row.timestamp(line)?,
                }),
                "cancel-admission" => Ok(Command::CancelAdmission {
                    actor,
                    admission: required(row.admission, line, "admission")?,
                }),
                "discharge" => Ok(Command::Discharge {
                    actor,
                    admission: required(row.admission, line, "admission")?,
                    discharged_at: row.timestamp(line)?,
                }),
                "request-transfer" => {
                    let kind = required(row.kind.as_deref(), line, "kind")?;
                    let priority = required(row.priority.as_deref(), line, "priority")?;
                    Ok(Command::RequestTransfer {
                        actor,
                        admission: required(row.admission, line, "admission")?,
                        transfer_type: parsed(kind, line, "kind")?,
                        priority: parsed(priority, line, "priority")?,
                        reason: required(row.reason.clone(), line, "reason")?,
                        to_bed: row.bed,
                        scheduled_at: row.timestamp(line)?,
                        reserve_minutes: row.minutes.unwrap_or(DEFAULT_RESERVE_MINUTES),
                    })
                }
                "approve-transfer" => {
                    let approve = required(row.approve, line, "approve")?;
                    let (note, rejected_reason) = if approve {
                        (row.reason.clone(), None)
                    } else {
                        (None, row.reason.clone())
                    };
                    Ok(Command::ApproveTransfer {
                        actor,
                        transfer: required(row.transfer, line, "transfer")?,
                        approve,
                        note,
                        rejected_reason,
                    })
                }
                "assign-bed" => Ok(Command::AssignTransferBed {
                    actor,
                    transfer: required(row.transfer, line, "transfer")?,
                    bed: required(row.bed, line, "bed")?,
                    scheduled_at: row.timestamp(line)?,
                    reserve_minutes: row.minutes.unwrap_or(DEFAULT_RESERVE_MINUTES),
                }),
                "complete-transfer" => Ok(Command::CompleteTransfer {
                    actor,
                    transfer: required(row.transfer, line, "transfer")?,
                    vacated_at: None,
                    occupied_at: row.timestamp(line)?,
                    handover: None,
                }),
                "cancel-transfer" => Ok(Command::CancelTransfer {
                    actor,
                    transfer: required(row.transfer, line, "transfer")?,
                    reason: required(row.reason.clone(), line, "reason")?,
                }),
                "set-bed-state" => {
                    let state = required(row.kind.as_deref(), line, "kind")?;
                    Ok(Command::SetBedState {
                        actor,
                        bed: required(row.bed, line, "bed")?,
                        state: parsed::<BedState>(state, line, "kind")?,
                        reserved_until: row.timestamp(line)?,
                        note: row.reason.clone(),
                    })
                }
                other => Err(CsvError::UnrecognizedOp {
                    line,
                    op: other.to_string(),
                }),
            }
        })
}

#[derive(Debug, Serialize)]
struct CensusRow {
    bed: BedId,
    room: String,
    ward: String,
    state: String,
    admission: Option<AdmissionId>,
    patient: Option<PatientId>,
}

/// Write the final bed census in csv format
pub fn write_census(
    writer: impl io::Write,
    rows: impl IntoIterator<Item = (BedId, String, String, BedState, Option<AdmissionId>, Option<PatientId>)>,
) {
    let mut writer = csv::Writer::from_writer(writer);
    for (bed, room, ward, state, admission, patient) in rows {
        let row = CensusRow {
            bed,
            room,
            ward,
            state: state.to_string(),
            admission,
            patient,
        };
        writer.serialize(&row).expect("failed to write csv row");
    }
    writer.flush().expect("failed to flush csv writer");
}

#[derive(Debug, Serialize)]
struct ChargeSummaryRow {
    admission: AdmissionId,
    patient: PatientId,
    days: usize,
    total: String,
    missing_rate_days: u32,
}

/// Write per-admission charge summaries in csv format
pub fn write_charge_summaries(
    writer: impl io::Write,
    rows: impl IntoIterator<Item = (AdmissionId, PatientId, usize, Amount, u32)>,
) {
    let mut writer = csv::Writer::from_writer(writer);
    for (admission, patient, days, total, missing_rate_days) in rows {
        let row = ChargeSummaryRow {
            admission,
            patient,
            days,
            total: total.to_string(),
            missing_rate_days,
        };
        writer.serialize(&row).expect("failed to write csv row");
    }
    writer.flush().expect("failed to flush csv writer");
}
