//! Transfer workflow: requested → approved/rejected → scheduled → completed,
//! with cancel reachable from any open state.
//!
//! Steps are short and commit independently; no reservation or lock spans a
//! human wait point. Each step re-validates the persisted state before
//! acting, so a stale actor loses on the status check or on the bed CAS,
//! never by blocking.

use chrono::{DateTime, Duration, Utc};

use super::error::{
    ConflictError, EngineError, NotFound, PreconditionFailed, TransferStatusLabel, ValidationError,
};
use super::{Engine, ReservationOwner, next_id};
use crate::access::{Actor, Capability};
use crate::model::{
    AdmissionId, AdmissionStatus, AuditEntry, BedId, HandoverChecklist, NewTransfer, TransferAction,
    TransferId, TransferRequest, TransferStatus, normalize_timestamp,
};

impl Engine {
    pub fn get_transfer(&self, id: TransferId) -> Option<&TransferRequest> {
        self.transfers.get(&id)
    }

    pub fn list_transfers(&self, admission_id: AdmissionId) -> Vec<TransferRequest> {
        let mut transfers: Vec<TransferRequest> = self
            .transfers
            .values()
            .filter(|t| t.admission_id == admission_id)
            .cloned()
            .collect();
        transfers.sort_by_key(|t| t.id);
        transfers
    }

    /// File a transfer request for an admitted patient.
    ///
    /// When a target bed is named and cannot be reserved, the request is
    /// still created with `to_bed_id` cleared, deferring target selection to
    /// a later [`Engine::assign_transfer_bed`] call.
    pub fn request_transfer(
        &mut self,
        actor: &Actor,
        new: NewTransfer,
    ) -> Result<TransferRequest, EngineError> {
        self.authorize(actor, Capability::TransferCreate)?;
        if new.admission_id == 0 {
            return Err(ValidationError::ZeroId("admission_id").into());
        }
        if new.reason.trim().is_empty() {
            return Err(ValidationError::MissingField("reason").into());
        }
        if new.reserve_minutes == 0 {
            return Err(ValidationError::NonPositiveReserve.into());
        }

        let admission = self
            .admissions
            .get(&new.admission_id)
            .ok_or(NotFound::Admission(new.admission_id))?;
        if admission.status != AdmissionStatus::Admitted {
            return Err(PreconditionFailed::AdmissionStatus {
                admission: new.admission_id,
                status: super::error::AdmissionStatusLabel(admission.status),
            }
            .into());
        }
        if let Some(&open) = self.open_transfers.get(&new.admission_id) {
            return Err(ConflictError::TransferInFlight {
                admission: new.admission_id,
                transfer: open,
            }
            .into());
        }
        let from_bed_id = admission.current_bed_id;

        let now = self.clock.now();
        let id = next_id(&mut self.ids.transfer);
        let to_bed_id = match new.to_bed_id {
            Some(candidate) => {
                let until = now + Duration::minutes(new.reserve_minutes as i64);
                match self.claim_reserve(candidate, until, ReservationOwner::Transfer(id)) {
                    Ok(()) => Some(candidate),
                    // soft-fail to manual assignment on contention
                    Err(EngineError::Conflict(_)) => None,
                    Err(other) => {
                        self.ids.transfer -= 1;
                        return Err(other);
                    }
                }
            }
            None => None,
        };

        let request = TransferRequest {
            id,
            admission_id: new.admission_id,
            transfer_type: new.transfer_type,
            priority: new.priority,
            status: TransferStatus::Requested,
            from_bed_id,
            to_bed_id,
            reserve_minutes: new.reserve_minutes,
            requested_at: now,
            approved_at: None,
            scheduled_at: new.scheduled_at.map(normalize_timestamp),
            completed_at: None,
            cancelled_at: None,
            reason: new.reason,
            request_note: new.request_note,
            approval_note: None,
            rejected_reason: None,
            cancel_reason: None,
            handover: None,
            audit: vec![AuditEntry {
                actor: actor.id.clone(),
                action: TransferAction::Requested,
                at: now,
            }],
        };
        self.transfers.insert(id, request.clone());
        self.open_transfers.insert(new.admission_id, id);
        Ok(request)
    }

    /// Decide a requested transfer. Rejection requires a reason and releases
    /// any held reservation.
    pub fn approve_transfer(
        &mut self,
        actor: &Actor,
        id: TransferId,
        approve: bool,
        approval_note: Option<String>,
        rejected_reason: Option<String>,
    ) -> Result<TransferRequest, EngineError> {
        self.authorize(actor, Capability::TransferApprove)?;

        let request = self.transfers.get(&id).ok_or(NotFound::Transfer(id))?;
        if request.status != TransferStatus::Requested {
            return Err(PreconditionFailed::TransferStatus {
                transfer: id,
                status: TransferStatusLabel(request.status),
                expected: "requested",
            }
            .into());
        }

        let now = self.clock.now();
        if approve {
            let request = self.transfers.get_mut(&id).ok_or(NotFound::Transfer(id))?;
            request.status = TransferStatus::Approved;
            request.approved_at = Some(now);
            request.approval_note = approval_note;
            request.audit.push(AuditEntry {
                actor: actor.id.clone(),
                action: TransferAction::Approved,
                at: now,
            });
            Ok(request.clone())
        } else {
            let reason = rejected_reason
                .filter(|r| !r.trim().is_empty())
                .ok_or(ValidationError::MissingField("rejected_reason"))?;

            let (admission_id, held) = (request.admission_id, request.to_bed_id);
            if let Some(bed) = held {
                self.release_transfer_reservation(bed, id);
            }
            self.open_transfers.remove(&admission_id);

            let request = self.transfers.get_mut(&id).ok_or(NotFound::Transfer(id))?;
            request.status = TransferStatus::Rejected;
            request.rejected_reason = Some(reason);
            request.approval_note = approval_note;
            request.audit.push(AuditEntry {
                actor: actor.id.clone(),
                action: TransferAction::Rejected,
                at: now,
            });
            Ok(request.clone())
        }
    }

    /// Point an approved transfer at a concrete target bed, reserving it.
    ///
    /// The new bed is claimed before the old reservation is dropped, so a
    /// losing claim leaves the request exactly as it was.
    pub fn assign_transfer_bed(
        &mut self,
        actor: &Actor,
        id: TransferId,
        bed_id: BedId,
        scheduled_at: Option<DateTime<Utc>>,
        reserve_minutes: u32,
    ) -> Result<TransferRequest, EngineError> {
        self.authorize(actor, Capability::TransferApprove)?;
        if bed_id == 0 {
            return Err(ValidationError::ZeroId("bed_id").into());
        }
        if reserve_minutes == 0 {
            return Err(ValidationError::NonPositiveReserve.into());
        }

        let request = self.transfers.get(&id).ok_or(NotFound::Transfer(id))?;
        if !matches!(
            request.status,
            TransferStatus::Approved | TransferStatus::Scheduled
        ) {
            return Err(PreconditionFailed::TransferStatus {
                transfer: id,
                status: TransferStatusLabel(request.status),
                expected: "approved or scheduled",
            }
            .into());
        }
        let previous = request.to_bed_id;

        let now = self.clock.now();
        let until = now + Duration::minutes(reserve_minutes as i64);
        let mut released_previous = false;
        if previous == Some(bed_id) && self.holds_reservation(bed_id, id) {
            // same target: refresh the TTL on the existing hold
            if let Some(bed) = self.beds.get_mut(&bed_id) {
                bed.reserved_until = Some(until);
            }
        } else {
            self.claim_reserve(bed_id, until, ReservationOwner::Transfer(id))?;
            if let Some(old) = previous
                && old != bed_id
            {
                self.release_transfer_reservation(old, id);
                released_previous = true;
            }
        }

        let request = self.transfers.get_mut(&id).ok_or(NotFound::Transfer(id))?;
        request.to_bed_id = Some(bed_id);
        request.reserve_minutes = reserve_minutes;
        if released_previous {
            request.audit.push(AuditEntry {
                actor: actor.id.clone(),
                action: TransferAction::ReservationReleased,
                at: now,
            });
        }
        request.audit.push(AuditEntry {
            actor: actor.id.clone(),
            action: TransferAction::BedAssigned,
            at: now,
        });
        if let Some(at) = scheduled_at {
            request.status = TransferStatus::Scheduled;
            request.scheduled_at = Some(normalize_timestamp(at));
            request.audit.push(AuditEntry {
                actor: actor.id.clone(),
                action: TransferAction::Scheduled,
                at: now,
            });
        }
        Ok(request.clone())
    }

    /// Commit the move: occupy the target bed, vacate the old one and rebind
    /// the admission, all in one atomic unit. The bed claim is the only
    /// fallible step and runs first, so a loss mutates nothing.
    pub fn complete_transfer(
        &mut self,
        actor: &Actor,
        id: TransferId,
        vacated_at: Option<DateTime<Utc>>,
        occupied_at: Option<DateTime<Utc>>,
        handover: Option<HandoverChecklist>,
    ) -> Result<TransferRequest, EngineError> {
        self.authorize(actor, Capability::TransferComplete)?;

        let request = self.transfers.get(&id).ok_or(NotFound::Transfer(id))?;
        if !matches!(
            request.status,
            TransferStatus::Approved | TransferStatus::Scheduled
        ) {
            return Err(PreconditionFailed::TransferStatus {
                transfer: id,
                status: TransferStatusLabel(request.status),
                expected: "approved or scheduled",
            }
            .into());
        }
        let Some(to_bed) = request.to_bed_id else {
            return Err(PreconditionFailed::NoTargetBed(id).into());
        };
        let admission_id = request.admission_id;

        let now = self.clock.now();
        let vacated_at = vacated_at.map(normalize_timestamp);
        let occupied_at = occupied_at.map(normalize_timestamp).unwrap_or(now);
        if let Some(vacated) = vacated_at
            && occupied_at < vacated
        {
            return Err(ValidationError::OutOfOrderTimestamp {
                field: "occupied_at",
                anchor: "vacated_at",
            }
            .into());
        }
        let from_bed = self
            .admissions
            .get(&admission_id)
            .map(|a| a.current_bed_id)
            .ok_or(NotFound::Admission(admission_id))?;

        self.claim_occupy(to_bed, admission_id, Some(id))?;
        self.vacate_bed(from_bed);
        self.rebind_admission_bed(admission_id, to_bed);
        self.open_transfers.remove(&admission_id);

        let request = self.transfers.get_mut(&id).ok_or(NotFound::Transfer(id))?;
        request.status = TransferStatus::Completed;
        request.completed_at = Some(occupied_at);
        request.handover = handover;
        request.audit.push(AuditEntry {
            actor: actor.id.clone(),
            action: TransferAction::Completed,
            at: now,
        });
        Ok(request.clone())
    }

    /// Cancel an open transfer, releasing any held reservation. Idempotent
    /// on an already cancelled request.
    pub fn cancel_transfer(
        &mut self,
        actor: &Actor,
        id: TransferId,
        reason: &str,
    ) -> Result<TransferRequest, EngineError> {
        self.authorize(actor, Capability::TransferCancel)?;

        let request = self.transfers.get(&id).ok_or(NotFound::Transfer(id))?;
        if request.status == TransferStatus::Cancelled {
            // client retry storms tolerate a repeat cancel
            return Ok(request.clone());
        }
        if request.status.is_terminal() {
            return Err(PreconditionFailed::TransferStatus {
                transfer: id,
                status: TransferStatusLabel(request.status),
                expected: "an open status",
            }
            .into());
        }
        if reason.trim().is_empty() {
            return Err(ValidationError::MissingField("reason").into());
        }

        let (admission_id, held) = (request.admission_id, request.to_bed_id);
        let now = self.clock.now();
        let mut released = false;
        if let Some(bed) = held
            && self.holds_reservation(bed, id)
        {
            self.release_transfer_reservation(bed, id);
            released = true;
        }
        self.open_transfers.remove(&admission_id);

        let request = self.transfers.get_mut(&id).ok_or(NotFound::Transfer(id))?;
        request.status = TransferStatus::Cancelled;
        request.cancelled_at = Some(now);
        request.cancel_reason = Some(reason.to_string());
        if released {
            request.audit.push(AuditEntry {
                actor: actor.id.clone(),
                action: TransferAction::ReservationReleased,
                at: now,
            });
        }
        request.audit.push(AuditEntry {
            actor: actor.id.clone(),
            action: TransferAction::Cancelled,
            at: now,
        });
        Ok(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{admin, seeded, ts};
    use super::*;
    use crate::access::{InMemoryPatients, StaticPolicy};
    use crate::clock::ManualClock;
    use crate::model::{BedState, NewAdmission, TransferPriority, TransferType};

    fn admit(engine: &mut Engine, patient: u32, bed: u32) -> AdmissionId {
        engine
            .create_admission(
                &admin(),
                NewAdmission {
                    patient_id: patient,
                    bed_id: bed,
                    admitted_at: None,
                    expected_discharge_at: None,
                    attending_practitioner: None,
                    diagnosis: None,
                    payor: None,
                },
            )
            .unwrap()
            .id
    }

    fn request(engine: &mut Engine, admission: AdmissionId, to_bed: Option<u32>) -> TransferRequest {
        engine
            .request_transfer(
                &admin(),
                NewTransfer {
                    admission_id: admission,
                    transfer_type: TransferType::Clinical,
                    priority: TransferPriority::Routine,
                    reason: "step-down care".into(),
                    request_note: None,
                    to_bed_id: to_bed,
                    scheduled_at: None,
                    reserve_minutes: 30,
                },
            )
            .unwrap()
    }

    #[test]
    fn request_reserves_named_vacant_bed() {
        let (mut engine, _clock) = seeded();
        let admission = admit(&mut engine, 101, 1);

        let req = request(&mut engine, admission, Some(3));
        assert_eq!(req.status, TransferStatus::Requested);
        assert_eq!(req.to_bed_id, Some(3));
        assert_eq!(req.from_bed_id, 1);
        assert_eq!(engine.get_bed(3).unwrap().state, BedState::Reserved);
    }

    #[test]
    fn request_keeps_going_when_target_bed_taken() {
        let (mut engine, _clock) = seeded();
        let a1 = admit(&mut engine, 101, 1);
        admit(&mut engine, 102, 2);

        // bed 2 is occupied; the request is still created, target cleared
        let req = request(&mut engine, a1, Some(2));
        assert_eq!(req.status, TransferStatus::Requested);
        assert_eq!(req.to_bed_id, None);
        assert_eq!(engine.get_bed(2).unwrap().state, BedState::Occupied);
    }

    #[test]
    fn request_requires_reason() {
        let (mut engine, _clock) = seeded();
        let admission = admit(&mut engine, 101, 1);

        let result = engine.request_transfer(
            &admin(),
            NewTransfer {
                admission_id: admission,
                transfer_type: TransferType::Operational,
                priority: TransferPriority::Routine,
                reason: "".into(),
                request_note: None,
                to_bed_id: None,
                scheduled_at: None,
                reserve_minutes: 30,
            },
        );
        assert!(matches!(
            result,
            Err(EngineError::Validation(ValidationError::MissingField("reason")))
        ));
    }

    #[test]
    fn second_open_request_for_same_admission_conflicts() {
        let (mut engine, _clock) = seeded();
        let admission = admit(&mut engine, 101, 1);
        request(&mut engine, admission, None);

        let result = engine.request_transfer(
            &admin(),
            NewTransfer {
                admission_id: admission,
                transfer_type: TransferType::Clinical,
                priority: TransferPriority::Urgent,
                reason: "duplicate".into(),
                request_note: None,
                to_bed_id: None,
                scheduled_at: None,
                reserve_minutes: 30,
            },
        );
        assert!(matches!(
            result,
            Err(EngineError::Conflict(ConflictError::TransferInFlight { .. }))
        ));
    }

    #[test]
    fn reject_requires_reason_and_releases_reservation() {
        let (mut engine, _clock) = seeded();
        let admission = admit(&mut engine, 101, 1);
        let req = request(&mut engine, admission, Some(3));

        let missing = engine.approve_transfer(&admin(), req.id, false, None, None);
        assert!(matches!(
            missing,
            Err(EngineError::Validation(ValidationError::MissingField(
                "rejected_reason"
            )))
        ));

        let rejected = engine
            .approve_transfer(&admin(), req.id, false, None, Some("no clinical need".into()))
            .unwrap();
        assert_eq!(rejected.status, TransferStatus::Rejected);
        assert_eq!(rejected.rejected_reason.as_deref(), Some("no clinical need"));
        assert_eq!(engine.get_bed(3).unwrap().state, BedState::Vacant);
    }

    #[test]
    fn deciding_twice_is_a_precondition_failure() {
        let (mut engine, _clock) = seeded();
        let admission = admit(&mut engine, 101, 1);
        let req = request(&mut engine, admission, None);
        engine.approve_transfer(&admin(), req.id, true, None, None).unwrap();

        let again = engine.approve_transfer(&admin(), req.id, true, None, None);
        assert!(matches!(
            again,
            Err(EngineError::Precondition(PreconditionFailed::TransferStatus {
                expected: "requested",
                ..
            }))
        ));
    }

    #[test]
    fn assign_claims_new_bed_then_drops_old_hold() {
        let (mut engine, _clock) = seeded();
        let admission = admit(&mut engine, 101, 1);
        let req = request(&mut engine, admission, Some(3));
        engine.approve_transfer(&admin(), req.id, true, None, None).unwrap();

        let assigned = engine
            .assign_transfer_bed(&admin(), req.id, 4, None, 45)
            .unwrap();
        assert_eq!(assigned.to_bed_id, Some(4));
        assert_eq!(assigned.status, TransferStatus::Approved);
        assert_eq!(engine.get_bed(4).unwrap().state, BedState::Reserved);
        assert_eq!(engine.get_bed(3).unwrap().state, BedState::Vacant);
    }

    #[test]
    fn losing_assign_leaves_request_untouched() {
        let (mut engine, _clock) = seeded();
        let a1 = admit(&mut engine, 101, 1);
        admit(&mut engine, 102, 2);
        let req = request(&mut engine, a1, Some(3));
        engine.approve_transfer(&admin(), req.id, true, None, None).unwrap();

        // bed 2 is occupied: the claim loses, the old hold must survive
        let result = engine.assign_transfer_bed(&admin(), req.id, 2, None, 30);
        assert!(matches!(
            result,
            Err(EngineError::Conflict(ConflictError::BedUnavailable { bed: 2, .. }))
        ));
        assert_eq!(engine.get_transfer(req.id).unwrap().to_bed_id, Some(3));
        assert_eq!(engine.get_bed(3).unwrap().state, BedState::Reserved);
    }

    #[test]
    fn assign_with_schedule_moves_to_scheduled() {
        let (mut engine, _clock) = seeded();
        let admission = admit(&mut engine, 101, 1);
        let req = request(&mut engine, admission, None);
        engine.approve_transfer(&admin(), req.id, true, None, None).unwrap();

        let scheduled = engine
            .assign_transfer_bed(&admin(), req.id, 3, Some(ts("2025-03-11T09:00:00Z")), 30)
            .unwrap();
        assert_eq!(scheduled.status, TransferStatus::Scheduled);
        assert_eq!(scheduled.scheduled_at, Some(ts("2025-03-11T09:00:00Z")));
    }

    #[test]
    fn complete_without_target_fails_with_zero_mutation() {
        let (mut engine, _clock) = seeded();
        let a1 = admit(&mut engine, 101, 1);
        admit(&mut engine, 102, 2);
        let req = request(&mut engine, a1, Some(2)); // soft-fails to None
        engine.approve_transfer(&admin(), req.id, true, None, None).unwrap();

        let result = engine.complete_transfer(&admin(), req.id, None, None, None);
        assert!(matches!(
            result,
            Err(EngineError::Precondition(PreconditionFailed::NoTargetBed(_)))
        ));

        let untouched = engine.get_transfer(req.id).unwrap();
        assert_eq!(untouched.status, TransferStatus::Approved);
        assert_eq!(engine.get_admission(a1).unwrap().current_bed_id, 1);
        assert_eq!(engine.get_bed(1).unwrap().state, BedState::Occupied);
    }

    #[test]
    fn full_workflow_moves_the_admission() {
        let (mut engine, _clock) = seeded();
        let a1 = admit(&mut engine, 101, 1);
        admit(&mut engine, 102, 2);

        // request names occupied bed 2: soft-fail, then approve and assign 3
        let req = request(&mut engine, a1, Some(2));
        assert_eq!(req.to_bed_id, None);
        engine.approve_transfer(&admin(), req.id, true, None, None).unwrap();
        engine.assign_transfer_bed(&admin(), req.id, 3, None, 30).unwrap();
        assert_eq!(engine.get_bed(3).unwrap().state, BedState::Reserved);

        let handover = HandoverChecklist {
            items: vec![crate::model::ChecklistItem {
                label: "IV lines handed over".into(),
                done: true,
            }],
            note: Some("stable".into()),
        };
        let done = engine
            .complete_transfer(
                &admin(),
                req.id,
                Some(ts("2025-03-10T11:55:00Z")),
                Some(ts("2025-03-10T12:00:00Z")),
                Some(handover.clone()),
            )
            .unwrap();

        assert_eq!(done.status, TransferStatus::Completed);
        assert_eq!(done.completed_at, Some(ts("2025-03-10T12:00:00Z")));
        assert_eq!(done.handover, Some(handover));
        assert_eq!(engine.get_bed(3).unwrap().state, BedState::Occupied);
        assert_eq!(engine.get_bed(1).unwrap().state, BedState::Vacant);
        assert_eq!(engine.get_admission(a1).unwrap().current_bed_id, 3);
    }

    #[test]
    fn audit_trail_records_every_transition() {
        let (mut engine, _clock) = seeded();
        let admission = admit(&mut engine, 101, 1);
        let req = request(&mut engine, admission, None);
        engine.approve_transfer(&admin(), req.id, true, None, None).unwrap();
        engine.assign_transfer_bed(&admin(), req.id, 3, None, 30).unwrap();
        engine.complete_transfer(&admin(), req.id, None, None, None).unwrap();

        let actions: Vec<TransferAction> = engine
            .get_transfer(req.id)
            .unwrap()
            .audit
            .iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                TransferAction::Requested,
                TransferAction::Approved,
                TransferAction::BedAssigned,
                TransferAction::Completed,
            ]
        );
        assert!(
            engine
                .get_transfer(req.id)
                .unwrap()
                .audit
                .iter()
                .all(|e| e.actor == "test-admin")
        );
    }

    #[test]
    fn expired_reservation_loses_the_completion_race() {
        let (mut engine, clock) = seeded();
        let a1 = admit(&mut engine, 101, 1);
        let a2 = admit(&mut engine, 102, 2);

        let first = request(&mut engine, a1, Some(3));
        engine.approve_transfer(&admin(), first.id, true, None, None).unwrap();

        // first's 30-minute hold lapses; a second transfer claims bed 3
        clock.advance_minutes(45);
        let second = request(&mut engine, a2, Some(3));
        assert_eq!(second.to_bed_id, Some(3));

        let result = engine.complete_transfer(&admin(), first.id, None, None, None);
        assert!(matches!(
            result,
            Err(EngineError::Conflict(ConflictError::BedUnavailable { bed: 3, .. }))
        ));
        assert_eq!(engine.get_admission(a1).unwrap().current_bed_id, 1);
    }

    #[test]
    fn cancel_releases_hold_and_is_idempotent() {
        let (mut engine, _clock) = seeded();
        let admission = admit(&mut engine, 101, 1);
        let req = request(&mut engine, admission, Some(3));

        let cancelled = engine.cancel_transfer(&admin(), req.id, "patient declined").unwrap();
        assert_eq!(cancelled.status, TransferStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("patient declined"));
        assert_eq!(engine.get_bed(3).unwrap().state, BedState::Vacant);

        let audit_len = cancelled.audit.len();
        let again = engine.cancel_transfer(&admin(), req.id, "retry").unwrap();
        assert_eq!(again.status, TransferStatus::Cancelled);
        assert_eq!(again.cancel_reason.as_deref(), Some("patient declined"));
        assert_eq!(again.audit.len(), audit_len);
    }

    #[test]
    fn completed_transfer_cannot_be_cancelled() {
        let (mut engine, _clock) = seeded();
        let admission = admit(&mut engine, 101, 1);
        let req = request(&mut engine, admission, Some(3));
        engine.approve_transfer(&admin(), req.id, true, None, None).unwrap();
        engine.complete_transfer(&admin(), req.id, None, None, None).unwrap();

        let result = engine.cancel_transfer(&admin(), req.id, "too late");
        assert!(matches!(
            result,
            Err(EngineError::Precondition(PreconditionFailed::TransferStatus {
                expected: "an open status",
                ..
            }))
        ));
    }

    #[test]
    fn capability_gates_each_step_separately() {
        let clock = ManualClock::at(ts(super::super::testutil::BASE));
        let policy = StaticPolicy::new()
            .grant("admin", crate::access::Capability::ManageInventory)
            .grant("admin", crate::access::Capability::AdmitPatient)
            .grant("nurse", crate::access::Capability::TransferCreate);
        let mut engine = Engine::with_ports(
            Box::new(clock),
            Box::new(policy),
            Box::new(InMemoryPatients::with_ids([101])),
        );
        let boss = Actor::new("admin");
        engine
            .create_ward(
                &boss,
                crate::model::NewWard {
                    code: "W1".into(),
                    name: "West".into(),
                    floor: 1,
                },
            )
            .unwrap();
        engine
            .create_room(
                &boss,
                crate::model::NewRoom {
                    ward_id: 1,
                    number: "101".into(),
                    room_type: crate::model::RoomType::General,
                },
            )
            .unwrap();
        for code in ["A", "B"] {
            engine
                .create_bed(
                    &boss,
                    crate::model::NewBed {
                        room_id: 1,
                        code: code.into(),
                        note: None,
                    },
                )
                .unwrap();
        }
        engine
            .create_admission(
                &boss,
                NewAdmission {
                    patient_id: 101,
                    bed_id: 1,
                    admitted_at: None,
                    expected_discharge_at: None,
                    attending_practitioner: None,
                    diagnosis: None,
                    payor: None,
                },
            )
            .unwrap();

        let nurse = Actor::new("nurse");
        let req = engine
            .request_transfer(
                &nurse,
                NewTransfer {
                    admission_id: 1,
                    transfer_type: TransferType::Clinical,
                    priority: TransferPriority::Routine,
                    reason: "quieter room".into(),
                    request_note: None,
                    to_bed_id: Some(2),
                    scheduled_at: None,
                    reserve_minutes: 30,
                },
            )
            .unwrap();

        // the nurse may create but not approve
        let denied = engine.approve_transfer(&nurse, req.id, true, None, None);
        assert!(matches!(denied, Err(EngineError::Forbidden(_))));
        assert_eq!(
            engine.get_transfer(req.id).unwrap().status,
            TransferStatus::Requested
        );
    }
}
