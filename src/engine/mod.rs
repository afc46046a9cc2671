//! Bed & transfer lifecycle engine.
//!
//! Holds the bed inventory and drives the admission and transfer workflows
//! over it. Every state-changing call executes as one atomic unit against the
//! single-writer store; claiming calls carry the state the caller believes
//! the bed is in and lose with `BedUnavailable` when it is stale.
//! Also supports an async stream of workflow commands.

use std::collections::HashMap;

use tokio_stream::{Stream, StreamExt};
use tracing::info;

use crate::access::{Actor, AllowAll, Capability, CapabilityCheck, OpenPatientDirectory, PatientDirectory};
use crate::clock::{Clock, SystemClock};
use crate::model::{
    Admission, AdmissionId, Bed, BedId, BedRate, Command, PatientId, RateId, Room, RoomId,
    TransferId, TransferRequest, Ward, WardId,
};

mod admission;
mod beds;
mod charges;
mod error;
mod inventory;
mod transfer;

pub(crate) use beds::ReservationOwner;
pub use error::{
    ConflictError, EngineError, Forbidden, NotFound, PreconditionFailed, ValidationError,
};

/// The bed & transfer lifecycle engine.
///
/// Stateless between calls in the workflow sense: every operation takes its
/// full context (admission id, bed id, actor) as explicit parameters, and no
/// lock is held while a workflow step awaits human input.
pub struct Engine {
    clock: Box<dyn Clock>,
    access: Box<dyn CapabilityCheck>,
    patients: Box<dyn PatientDirectory>,

    wards: HashMap<WardId, Ward>,
    rooms: HashMap<RoomId, Room>,
    beds: HashMap<BedId, Bed>,
    rates: HashMap<RateId, BedRate>,
    admissions: HashMap<AdmissionId, Admission>,
    /// Transfer rows are never deleted, only advanced to a terminal status.
    transfers: HashMap<TransferId, TransferRequest>,

    /// patient -> admitted admission; the uniqueness guard for
    /// one-active-admission-per-patient.
    admitted_patients: HashMap<PatientId, AdmissionId>,
    /// bed -> admission occupying it.
    occupants: HashMap<BedId, AdmissionId>,
    /// bed -> who holds its live reservation.
    reservations: HashMap<BedId, ReservationOwner>,
    /// admission -> its open (non-terminal) transfer; the mid-flight guard.
    open_transfers: HashMap<AdmissionId, TransferId>,

    ids: IdCounters,
}

#[derive(Default)]
struct IdCounters {
    ward: u32,
    room: u32,
    bed: u32,
    rate: u32,
    admission: u32,
    transfer: u32,
}

fn next_id(slot: &mut u32) -> u32 {
    *slot += 1;
    *slot
}

/// Public API
impl Engine {
    /// Engine with the system clock, an allow-all capability policy and an
    /// open patient directory. Use [`Engine::with_ports`] to plug real ones.
    pub fn new() -> Self {
        Self::with_ports(
            Box::new(SystemClock),
            Box::new(AllowAll),
            Box::new(OpenPatientDirectory),
        )
    }

    pub fn with_ports(
        clock: Box<dyn Clock>,
        access: Box<dyn CapabilityCheck>,
        patients: Box<dyn PatientDirectory>,
    ) -> Self {
        Self {
            clock,
            access,
            patients,
            wards: HashMap::new(),
            rooms: HashMap::new(),
            beds: HashMap::new(),
            rates: HashMap::new(),
            admissions: HashMap::new(),
            transfers: HashMap::new(),
            admitted_patients: HashMap::new(),
            occupants: HashMap::new(),
            reservations: HashMap::new(),
            open_transfers: HashMap::new(),
            ids: IdCounters::default(),
        }
    }

    /// Run the engine over a stream of workflow commands.
    pub async fn run(&mut self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(command) = stream.next().await {
            // a rejected command must not stop the replay
            let _ = self.apply(command);
        }
    }

    /// Apply a single workflow command on top of the current state.
    pub fn apply(&mut self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::Admit {
                actor,
                patient,
                bed,
                admitted_at,
            } => {
                let result = self.create_admission(
                    &actor,
                    crate::model::NewAdmission {
                        patient_id: patient,
                        bed_id: bed,
                        admitted_at,
                        expected_discharge_at: None,
                        attending_practitioner: None,
                        diagnosis: None,
                        payor: None,
                    },
                );
                Self::log_outcome("admit", patient, &result);
                result?;
            }
            Command::CancelAdmission { actor, admission } => {
                let result = self.cancel_admission(&actor, admission);
                Self::log_outcome("cancel-admission", admission, &result);
                result?;
            }
            Command::Discharge {
                actor,
                admission,
                discharged_at,
            } => {
                let result = self.discharge_admission(&actor, admission, discharged_at);
                Self::log_outcome("discharge", admission, &result);
                result?;
            }
            Command::RequestTransfer {
                actor,
                admission,
                transfer_type,
                priority,
                reason,
                to_bed,
                scheduled_at,
                reserve_minutes,
            } => {
                let result = self.request_transfer(
                    &actor,
                    crate::model::NewTransfer {
                        admission_id: admission,
                        transfer_type,
                        priority,
                        reason,
                        request_note: None,
                        to_bed_id: to_bed,
                        scheduled_at,
                        reserve_minutes,
                    },
                );
                Self::log_outcome("request-transfer", admission, &result);
                result?;
            }
            Command::ApproveTransfer {
                actor,
                transfer,
                approve,
                note,
                rejected_reason,
            } => {
                let result = self.approve_transfer(&actor, transfer, approve, note, rejected_reason);
                Self::log_outcome("approve-transfer", transfer, &result);
                result?;
            }
            Command::AssignTransferBed {
                actor,
                transfer,
                bed,
                scheduled_at,
                reserve_minutes,
            } => {
                let result =
                    self.assign_transfer_bed(&actor, transfer, bed, scheduled_at, reserve_minutes);
                Self::log_outcome("assign-bed", transfer, &result);
                result?;
            }
            Command::CompleteTransfer {
                actor,
                transfer,
                vacated_at,
                occupied_at,
                handover,
            } => {
                let result =
                    self.complete_transfer(&actor, transfer, vacated_at, occupied_at, handover);
                Self::log_outcome("complete-transfer", transfer, &result);
                result?;
            }
            Command::CancelTransfer {
                actor,
                transfer,
                reason,
            } => {
                let result = self.cancel_transfer(&actor, transfer, &reason);
                Self::log_outcome("cancel-transfer", transfer, &result);
                result?;
            }
            Command::SetBedState {
                actor,
                bed,
                state,
                reserved_until,
                note,
            } => {
                let result = self.set_bed_state(&actor, bed, state, reserved_until, note);
                Self::log_outcome("set-bed-state", bed, &result);
                result?;
            }
        }
        Ok(())
    }
}

/// Private API
impl Engine {
    /// Single capability gate, invoked once per mutating operation.
    fn authorize(&self, actor: &Actor, capability: Capability) -> Result<(), Forbidden> {
        if self.access.allows(actor, capability) {
            Ok(())
        } else {
            Err(Forbidden {
                actor: actor.id.clone(),
                capability,
            })
        }
    }

    /// Small helper to log `apply` results
    fn log_outcome<T>(op: &'static str, subject: u32, result: &Result<T, EngineError>) {
        match result {
            Ok(_) => {
                info!(op, subject, "command applied");
            }
            Err(e) => {
                info!(op, subject, reason = %e, "command skipped");
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::{DateTime, Utc};

    use super::Engine;
    use crate::access::{Actor, AllowAll, InMemoryPatients};
    use crate::clock::ManualClock;
    use crate::model::{NewBed, NewRoom, NewWard, RoomType};

    pub(crate) const BASE: &str = "2025-03-10T08:00:00Z";

    pub(crate) fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    pub(crate) fn admin() -> Actor {
        Actor::new("test-admin")
    }

    /// Engine with a manual clock at [`BASE`], patients 101..=109 and a small
    /// inventory: ward 1 with room 1 (general, beds 1-2), room 2 (private,
    /// bed 3), room 3 (icu, bed 4).
    pub(crate) fn seeded() -> (Engine, ManualClock) {
        let clock = ManualClock::at(ts(BASE));
        let mut engine = Engine::with_ports(
            Box::new(clock.clone()),
            Box::new(AllowAll),
            Box::new(InMemoryPatients::with_ids(101..=109)),
        );
        let actor = admin();

        engine
            .create_ward(
                &actor,
                NewWard {
                    code: "W1".into(),
                    name: "West Wing".into(),
                    floor: 2,
                },
            )
            .unwrap();
        for (number, room_type) in [
            ("201", RoomType::General),
            ("202", RoomType::Private),
            ("203", RoomType::Icu),
        ] {
            engine
                .create_room(
                    &actor,
                    NewRoom {
                        ward_id: 1,
                        number: number.into(),
                        room_type,
                    },
                )
                .unwrap();
        }
        for (room_id, code) in [(1, "201-A"), (1, "201-B"), (2, "202-A"), (3, "203-A")] {
            engine
                .create_bed(
                    &actor,
                    NewBed {
                        room_id,
                        code: code.into(),
                        note: None,
                    },
                )
                .unwrap();
        }

        (engine, clock)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::testutil::{admin, seeded, ts};
    use super::*;
    use crate::access::{InMemoryPatients, StaticPolicy};
    use crate::clock::ManualClock;
    use crate::model::{BedState, TransferPriority, TransferType};

    fn admit(patient: PatientId, bed: BedId) -> Command {
        Command::Admit {
            actor: admin(),
            patient,
            bed,
            admitted_at: None,
        }
    }

    #[test]
    fn apply_admit_creates_admission() {
        let (mut engine, _clock) = seeded();
        engine.apply(admit(101, 1)).unwrap();

        let admission = engine.get_admission(1).unwrap();
        assert_eq!(admission.patient_id, 101);
        assert_eq!(admission.current_bed_id, 1);
        assert_eq!(engine.get_bed(1).unwrap().state, BedState::Occupied);
    }

    #[test]
    fn apply_surfaces_errors() {
        let (mut engine, _clock) = seeded();
        engine.apply(admit(101, 1)).unwrap();

        let result = engine.apply(admit(101, 2));
        assert!(matches!(
            result,
            Err(EngineError::Conflict(
                ConflictError::PatientAlreadyAdmitted { patient: 101, .. }
            ))
        ));
    }

    #[test]
    fn forbidden_actor_causes_no_state_change() {
        let clock = ManualClock::at(ts(super::testutil::BASE));
        let policy = StaticPolicy::new().grant("clerk", Capability::AdmitPatient);
        let mut engine = Engine::with_ports(
            Box::new(clock),
            Box::new(policy),
            Box::new(InMemoryPatients::with_ids([101])),
        );

        let result = engine.create_ward(
            &Actor::new("clerk"),
            crate::model::NewWard {
                code: "W1".into(),
                name: "West".into(),
                floor: 1,
            },
        );
        assert!(matches!(result, Err(EngineError::Forbidden(_))));
        assert!(engine.list_wards().is_empty());
    }

    #[tokio::test]
    async fn run_processes_all_commands() {
        let (mut engine, _clock) = seeded();
        let commands = vec![admit(101, 1), admit(102, 2)];

        engine.run(tokio_stream::iter(commands)).await;

        assert_eq!(engine.list_admissions(None, None).len(), 2);
        assert_eq!(engine.get_bed(1).unwrap().state, BedState::Occupied);
        assert_eq!(engine.get_bed(2).unwrap().state, BedState::Occupied);
    }

    #[tokio::test]
    async fn run_skips_failed_commands_and_continues() {
        let (mut engine, _clock) = seeded();
        let commands = vec![
            admit(101, 1),
            admit(102, 1), // bed already occupied, should be skipped
            admit(102, 2), // should still process
        ];

        engine.run(tokio_stream::iter(commands)).await;

        assert_eq!(engine.list_admissions(None, None).len(), 2);
        let second = engine.get_admission(2).unwrap();
        assert_eq!(second.current_bed_id, 2);
    }

    #[tokio::test]
    async fn concurrent_claims_on_one_bed_have_exactly_one_winner() {
        let (mut engine, _clock) = seeded();
        engine.apply(admit(101, 1)).unwrap();
        engine.apply(admit(102, 2)).unwrap();

        // Two approved transfers (ids 1 and 2), both about to target bed 4
        for (admission_id, transfer_id) in [(1, 1), (2, 2)] {
            engine
                .request_transfer(
                    &admin(),
                    crate::model::NewTransfer {
                        admission_id,
                        transfer_type: TransferType::Clinical,
                        priority: TransferPriority::Routine,
                        reason: "isolation".into(),
                        request_note: None,
                        to_bed_id: None,
                        scheduled_at: None,
                        reserve_minutes: 30,
                    },
                )
                .unwrap();
            engine
                .approve_transfer(&admin(), transfer_id, true, None, None)
                .unwrap();
        }

        let shared = Arc::new(tokio::sync::Mutex::new(engine));
        let mut handles = Vec::new();
        for transfer in [1u32, 2] {
            let shared = Arc::clone(&shared);
            handles.push(tokio::spawn(async move {
                let mut engine = shared.lock().await;
                engine
                    .assign_transfer_bed(&admin(), transfer, 4, None, 30)
                    .map(|t| t.id)
            }));
        }

        let mut winners = 0;
        let mut losers = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(EngineError::Conflict(ConflictError::BedUnavailable { bed: 4, .. })) => {
                    losers += 1
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((winners, losers), (1, 1));

        let engine = shared.lock().await;
        assert_eq!(engine.get_bed(4).unwrap().state, BedState::Reserved);
    }
}
