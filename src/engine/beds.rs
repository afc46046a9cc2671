//! Bed state machine: CAS-protected claims and lazy reservation expiry.
//!
//! Transition table: vacant→reserved (claim with TTL), vacant↔preoccupied
//! (manual hold), reserved→occupied (claim consumed), reserved→vacant
//! (expiry or release), occupied→vacant (discharge/transfer-out). Claiming
//! transitions compare the stored state against what the caller believes it
//! is; a mismatch loses with `BedUnavailable`.

use chrono::{DateTime, Utc};

use super::Engine;
use super::error::{ConflictError, EngineError, NotFound};
use crate::model::{AdmissionId, Bed, BedId, BedState, TransferId};

/// Who holds a bed's live reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReservationOwner {
    /// Held by a manual `set_bed_state` override.
    Manual,
    /// Held by a transfer request awaiting completion.
    Transfer(TransferId),
}

impl Engine {
    /// The state any writer must treat the bed as having right now: a
    /// reservation whose `reserved_until` has elapsed counts as vacant,
    /// evaluated against the engine clock, never a client clock.
    pub(crate) fn effective_bed_state(&self, bed: &Bed) -> BedState {
        match (bed.state, bed.reserved_until) {
            (BedState::Reserved, Some(until)) if until <= self.clock.now() => BedState::Vacant,
            (state, _) => state,
        }
    }

    /// Availability check shared by every claim: the bed must exist and be
    /// active. Returns the effective state for the CAS comparison.
    fn check_claimable(&self, bed_id: BedId) -> Result<BedState, EngineError> {
        let bed = self.beds.get(&bed_id).ok_or(NotFound::Bed(bed_id))?;
        if !bed.active {
            return Err(ConflictError::BedDisabled(bed_id).into());
        }
        Ok(self.effective_bed_state(bed))
    }

    /// CAS claim vacant→reserved with a TTL.
    pub(crate) fn claim_reserve(
        &mut self,
        bed_id: BedId,
        until: DateTime<Utc>,
        owner: ReservationOwner,
    ) -> Result<(), EngineError> {
        let actual = self.check_claimable(bed_id)?;
        if actual != BedState::Vacant {
            return Err(ConflictError::BedUnavailable {
                bed: bed_id,
                expected: BedState::Vacant,
                actual,
            }
            .into());
        }
        if let Some(bed) = self.beds.get_mut(&bed_id) {
            bed.state = BedState::Reserved;
            bed.reserved_until = Some(until);
        }
        self.reservations.insert(bed_id, owner);
        Ok(())
    }

    /// CAS claim →occupied. A fresh claim expects vacant; a transfer
    /// consuming its own reservation expects reserved, and only the owner
    /// may consume it.
    pub(crate) fn claim_occupy(
        &mut self,
        bed_id: BedId,
        admission: AdmissionId,
        via_transfer: Option<TransferId>,
    ) -> Result<(), EngineError> {
        let expected = match via_transfer {
            Some(_) => BedState::Reserved,
            None => BedState::Vacant,
        };
        let actual = self.check_claimable(bed_id)?;
        let allowed = match actual {
            BedState::Vacant => true,
            BedState::Reserved => via_transfer.is_some_and(|t| {
                self.reservations.get(&bed_id) == Some(&ReservationOwner::Transfer(t))
            }),
            _ => false,
        };
        if !allowed {
            return Err(ConflictError::BedUnavailable {
                bed: bed_id,
                expected,
                actual,
            }
            .into());
        }
        if let Some(bed) = self.beds.get_mut(&bed_id) {
            bed.state = BedState::Occupied;
            bed.reserved_until = None;
        }
        self.reservations.remove(&bed_id);
        self.occupants.insert(bed_id, admission);
        Ok(())
    }

    /// Unconditional →vacant, clearing any reservation and occupant.
    pub(crate) fn vacate_bed(&mut self, bed_id: BedId) {
        if let Some(bed) = self.beds.get_mut(&bed_id) {
            bed.state = BedState::Vacant;
            bed.reserved_until = None;
        }
        self.reservations.remove(&bed_id);
        self.occupants.remove(&bed_id);
    }

    /// Release a reservation held by the given transfer. A no-op when the
    /// hold has expired and another claimant has already taken the bed.
    pub(crate) fn release_transfer_reservation(&mut self, bed_id: BedId, transfer: TransferId) {
        if self.reservations.get(&bed_id) == Some(&ReservationOwner::Transfer(transfer)) {
            self.vacate_bed(bed_id);
        }
    }

    /// Whether the transfer still holds a live reservation on the bed.
    pub(crate) fn holds_reservation(&self, bed_id: BedId, transfer: TransferId) -> bool {
        self.reservations.get(&bed_id) == Some(&ReservationOwner::Transfer(transfer))
            && self
                .beds
                .get(&bed_id)
                .is_some_and(|bed| self.effective_bed_state(bed) == BedState::Reserved)
    }
}
