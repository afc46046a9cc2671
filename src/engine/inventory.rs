//! Inventory registry: wards, rooms, beds and the bed-rate table.
//!
//! Beds referenced by admission or transfer history are never hard-deleted;
//! `update_bed` with `active: false` is the soft-disable path.

use chrono::{DateTime, Utc};

use super::error::{ConflictError, EngineError, NotFound, ValidationError};
use super::{Engine, ReservationOwner, next_id};
use crate::access::{Actor, Capability};
use crate::model::{
    Bed, BedId, BedPatch, BedRate, BedState, NewBed, NewBedRate, NewRoom, NewWard, Room, RoomId,
    RoomPatch, RoomType, Ward, WardId, WardPatch, normalize_timestamp,
};

fn require_text(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn require_id(value: u32, field: &'static str) -> Result<(), ValidationError> {
    if value == 0 {
        Err(ValidationError::ZeroId(field))
    } else {
        Ok(())
    }
}

impl Engine {
    // Wards

    pub fn list_wards(&self) -> Vec<Ward> {
        let mut wards: Vec<Ward> = self.wards.values().cloned().collect();
        wards.sort_by_key(|w| w.id);
        wards
    }

    pub fn create_ward(&mut self, actor: &Actor, new: NewWard) -> Result<Ward, EngineError> {
        self.authorize(actor, Capability::ManageInventory)?;
        require_text(&new.code, "code")?;
        require_text(&new.name, "name")?;

        let ward = Ward {
            id: next_id(&mut self.ids.ward),
            code: new.code,
            name: new.name,
            floor: new.floor,
        };
        self.wards.insert(ward.id, ward.clone());
        Ok(ward)
    }

    pub fn update_ward(
        &mut self,
        actor: &Actor,
        id: WardId,
        patch: WardPatch,
    ) -> Result<Ward, EngineError> {
        self.authorize(actor, Capability::ManageInventory)?;
        if let Some(code) = &patch.code {
            require_text(code, "code")?;
        }
        if let Some(name) = &patch.name {
            require_text(name, "name")?;
        }

        let ward = self.wards.get_mut(&id).ok_or(NotFound::Ward(id))?;
        if let Some(code) = patch.code {
            ward.code = code;
        }
        if let Some(name) = patch.name {
            ward.name = name;
        }
        if let Some(floor) = patch.floor {
            ward.floor = floor;
        }
        Ok(ward.clone())
    }

    pub fn delete_ward(&mut self, actor: &Actor, id: WardId) -> Result<(), EngineError> {
        self.authorize(actor, Capability::ManageInventory)?;
        if !self.wards.contains_key(&id) {
            return Err(NotFound::Ward(id).into());
        }
        if self.rooms.values().any(|r| r.ward_id == id) {
            return Err(ConflictError::Referenced { kind: "ward", id }.into());
        }
        self.wards.remove(&id);
        Ok(())
    }

    // Rooms

    pub fn list_rooms(&self, ward_id: Option<WardId>) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .rooms
            .values()
            .filter(|r| ward_id.is_none_or(|w| r.ward_id == w))
            .cloned()
            .collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    pub fn create_room(&mut self, actor: &Actor, new: NewRoom) -> Result<Room, EngineError> {
        self.authorize(actor, Capability::ManageInventory)?;
        require_id(new.ward_id, "ward_id")?;
        require_text(&new.number, "number")?;
        if !self.wards.contains_key(&new.ward_id) {
            return Err(NotFound::Ward(new.ward_id).into());
        }

        let room = Room {
            id: next_id(&mut self.ids.room),
            ward_id: new.ward_id,
            number: new.number,
            room_type: new.room_type,
        };
        self.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    pub fn update_room(
        &mut self,
        actor: &Actor,
        id: RoomId,
        patch: RoomPatch,
    ) -> Result<Room, EngineError> {
        self.authorize(actor, Capability::ManageInventory)?;
        if let Some(number) = &patch.number {
            require_text(number, "number")?;
        }

        let room = self.rooms.get_mut(&id).ok_or(NotFound::Room(id))?;
        if let Some(number) = patch.number {
            room.number = number;
        }
        if let Some(room_type) = patch.room_type {
            room.room_type = room_type;
        }
        Ok(room.clone())
    }

    pub fn delete_room(&mut self, actor: &Actor, id: RoomId) -> Result<(), EngineError> {
        self.authorize(actor, Capability::ManageInventory)?;
        if !self.rooms.contains_key(&id) {
            return Err(NotFound::Room(id).into());
        }
        if self.beds.values().any(|b| b.room_id == id) {
            return Err(ConflictError::Referenced { kind: "room", id }.into());
        }
        self.rooms.remove(&id);
        Ok(())
    }

    // Beds

    /// List beds, optionally filtered by room and by *effective* state
    /// (an expired reservation lists as vacant).
    pub fn list_beds(&self, room_id: Option<RoomId>, state: Option<BedState>) -> Vec<Bed> {
        let mut beds: Vec<Bed> = self
            .beds
            .values()
            .filter(|b| room_id.is_none_or(|r| b.room_id == r))
            .filter(|b| state.is_none_or(|s| self.effective_bed_state(b) == s))
            .cloned()
            .collect();
        beds.sort_by_key(|b| b.id);
        beds
    }

    pub fn get_bed(&self, id: BedId) -> Option<&Bed> {
        self.beds.get(&id)
    }

    pub fn create_bed(&mut self, actor: &Actor, new: NewBed) -> Result<Bed, EngineError> {
        self.authorize(actor, Capability::ManageInventory)?;
        require_id(new.room_id, "room_id")?;
        require_text(&new.code, "code")?;
        if !self.rooms.contains_key(&new.room_id) {
            return Err(NotFound::Room(new.room_id).into());
        }

        let bed = Bed {
            id: next_id(&mut self.ids.bed),
            room_id: new.room_id,
            code: new.code,
            state: BedState::Vacant,
            reserved_until: None,
            note: new.note,
            active: true,
        };
        self.beds.insert(bed.id, bed.clone());
        Ok(bed)
    }

    pub fn update_bed(
        &mut self,
        actor: &Actor,
        id: BedId,
        patch: BedPatch,
    ) -> Result<Bed, EngineError> {
        self.authorize(actor, Capability::ManageInventory)?;
        if let Some(code) = &patch.code {
            require_text(code, "code")?;
        }

        let bed = self.beds.get_mut(&id).ok_or(NotFound::Bed(id))?;
        if let Some(code) = patch.code {
            bed.code = code;
        }
        if let Some(note) = patch.note {
            bed.note = Some(note);
        }
        if let Some(active) = patch.active {
            bed.active = active;
        }
        Ok(bed.clone())
    }

    pub fn delete_bed(&mut self, actor: &Actor, id: BedId) -> Result<(), EngineError> {
        self.authorize(actor, Capability::ManageInventory)?;
        if !self.beds.contains_key(&id) {
            return Err(NotFound::Bed(id).into());
        }
        let referenced = self.admissions.values().any(|a| a.current_bed_id == id)
            || self
                .transfers
                .values()
                .any(|t| t.from_bed_id == id || t.to_bed_id == Some(id));
        if referenced {
            return Err(ConflictError::Referenced { kind: "bed", id }.into());
        }
        self.beds.remove(&id);
        self.reservations.remove(&id);
        Ok(())
    }

    /// Manual bed-state override, outside the transfer workflow (cleaning
    /// holds, maintenance). Never valid against a bed an admitted admission
    /// occupies, and never a path to `occupied`.
    pub fn set_bed_state(
        &mut self,
        actor: &Actor,
        bed_id: BedId,
        state: BedState,
        reserved_until: Option<DateTime<Utc>>,
        note: Option<String>,
    ) -> Result<Bed, EngineError> {
        self.authorize(actor, Capability::ManageInventory)?;
        require_id(bed_id, "bed_id")?;

        let current = {
            let bed = self.beds.get(&bed_id).ok_or(NotFound::Bed(bed_id))?;
            self.effective_bed_state(bed)
        };
        if let Some(admission) = self.occupants.get(&bed_id) {
            return Err(ConflictError::BedOccupied {
                bed: bed_id,
                admission: *admission,
            }
            .into());
        }

        match state {
            BedState::Occupied => {
                return Err(ValidationError::UnsupportedManualState(state).into());
            }
            BedState::Preoccupied => {
                if current != BedState::Vacant {
                    return Err(ConflictError::BedUnavailable {
                        bed: bed_id,
                        expected: BedState::Vacant,
                        actual: current,
                    }
                    .into());
                }
                if let Some(bed) = self.beds.get_mut(&bed_id) {
                    bed.state = BedState::Preoccupied;
                    bed.reserved_until = None;
                }
                self.reservations.remove(&bed_id);
            }
            BedState::Reserved => {
                let until =
                    normalize_timestamp(reserved_until.ok_or(ValidationError::MissingReservedUntil)?);
                if until <= self.clock.now() {
                    return Err(ValidationError::OutOfOrderTimestamp {
                        field: "reserved_until",
                        anchor: "now",
                    }
                    .into());
                }
                self.claim_reserve(bed_id, until, ReservationOwner::Manual)?;
            }
            BedState::Vacant => {
                self.vacate_bed(bed_id);
            }
        }

        let bed = self.beds.get_mut(&bed_id).ok_or(NotFound::Bed(bed_id))?;
        if let Some(note) = note {
            bed.note = Some(note);
        }
        Ok(bed.clone())
    }

    // Bed rates

    pub fn list_bed_rates(&self, room_type: Option<RoomType>) -> Vec<BedRate> {
        let mut rates: Vec<BedRate> = self
            .rates
            .values()
            .filter(|r| room_type.is_none_or(|t| r.room_type == t))
            .cloned()
            .collect();
        rates.sort_by_key(|r| r.id);
        rates
    }

    pub fn create_bed_rate(
        &mut self,
        actor: &Actor,
        new: NewBedRate,
    ) -> Result<BedRate, EngineError> {
        self.authorize(actor, Capability::ManageInventory)?;
        if new.daily_rate.is_negative() {
            return Err(ValidationError::NegativeRate.into());
        }
        if let Some(to) = new.effective_to
            && to < new.effective_from
        {
            return Err(ValidationError::InvertedRateWindow.into());
        }

        let rate = BedRate {
            id: next_id(&mut self.ids.rate),
            room_type: new.room_type,
            daily_rate: new.daily_rate,
            effective_from: new.effective_from,
            effective_to: new.effective_to,
        };
        self.rates.insert(rate.id, rate.clone());
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{admin, seeded, ts};
    use super::*;
    use crate::Amount;

    #[test]
    fn seeded_inventory_lists_in_id_order() {
        let (engine, _clock) = seeded();
        assert_eq!(engine.list_wards().len(), 1);
        assert_eq!(engine.list_rooms(Some(1)).len(), 3);
        assert_eq!(engine.list_beds(None, None).len(), 4);
        assert_eq!(engine.list_beds(Some(1), None).len(), 2);
    }

    #[test]
    fn create_ward_rejects_blank_code() {
        let (mut engine, _clock) = seeded();
        let result = engine.create_ward(
            &admin(),
            NewWard {
                code: "  ".into(),
                name: "East".into(),
                floor: 1,
            },
        );
        assert!(matches!(
            result,
            Err(EngineError::Validation(ValidationError::MissingField("code")))
        ));
    }

    #[test]
    fn update_returns_the_updated_entity() {
        let (mut engine, _clock) = seeded();
        let ward = engine
            .update_ward(
                &admin(),
                1,
                WardPatch {
                    name: Some("North Wing".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ward.name, "North Wing");
        assert_eq!(ward.code, "W1");
    }

    #[test]
    fn delete_ward_with_rooms_conflicts() {
        let (mut engine, _clock) = seeded();
        let result = engine.delete_ward(&admin(), 1);
        assert!(matches!(
            result,
            Err(EngineError::Conflict(ConflictError::Referenced {
                kind: "ward",
                id: 1
            }))
        ));
    }

    #[test]
    fn delete_unreferenced_bed_succeeds() {
        let (mut engine, _clock) = seeded();
        engine.delete_bed(&admin(), 4).unwrap();
        assert!(engine.get_bed(4).is_none());
    }

    #[test]
    fn delete_bed_referenced_by_history_conflicts() {
        let (mut engine, _clock) = seeded();
        engine
            .create_admission(
                &admin(),
                crate::model::NewAdmission {
                    patient_id: 101,
                    bed_id: 4,
                    admitted_at: None,
                    expected_discharge_at: None,
                    attending_practitioner: None,
                    diagnosis: None,
                    payor: None,
                },
            )
            .unwrap();
        engine.discharge_admission(&admin(), 1, None).unwrap();

        // bed is vacant again but history still references it
        let result = engine.delete_bed(&admin(), 4);
        assert!(matches!(
            result,
            Err(EngineError::Conflict(ConflictError::Referenced {
                kind: "bed",
                id: 4
            }))
        ));
    }

    #[test]
    fn manual_preoccupied_hold_and_release() {
        let (mut engine, _clock) = seeded();
        let bed = engine
            .set_bed_state(
                &admin(),
                1,
                BedState::Preoccupied,
                None,
                Some("deep clean".into()),
            )
            .unwrap();
        assert_eq!(bed.state, BedState::Preoccupied);
        assert_eq!(bed.note.as_deref(), Some("deep clean"));

        let bed = engine
            .set_bed_state(&admin(), 1, BedState::Vacant, None, None)
            .unwrap();
        assert_eq!(bed.state, BedState::Vacant);
    }

    #[test]
    fn manual_reserve_requires_until() {
        let (mut engine, _clock) = seeded();
        let result = engine.set_bed_state(&admin(), 1, BedState::Reserved, None, None);
        assert!(matches!(
            result,
            Err(EngineError::Validation(ValidationError::MissingReservedUntil))
        ));
    }

    #[test]
    fn manual_reserve_rejects_past_until() {
        let (mut engine, _clock) = seeded();
        let result = engine.set_bed_state(
            &admin(),
            1,
            BedState::Reserved,
            Some(ts("2025-03-10T07:00:00Z")),
            None,
        );
        assert!(matches!(
            result,
            Err(EngineError::Validation(
                ValidationError::OutOfOrderTimestamp { .. }
            ))
        ));
    }

    #[test]
    fn manual_override_cannot_set_occupied() {
        let (mut engine, _clock) = seeded();
        let result = engine.set_bed_state(&admin(), 1, BedState::Occupied, None, None);
        assert!(matches!(
            result,
            Err(EngineError::Validation(
                ValidationError::UnsupportedManualState(BedState::Occupied)
            ))
        ));
    }

    #[test]
    fn manual_override_cannot_free_an_occupied_bed() {
        let (mut engine, _clock) = seeded();
        engine
            .create_admission(
                &admin(),
                crate::model::NewAdmission {
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

        let result = engine.set_bed_state(&admin(), 1, BedState::Vacant, None, None);
        assert!(matches!(
            result,
            Err(EngineError::Conflict(ConflictError::BedOccupied {
                bed: 1,
                admission: 1
            }))
        ));
        assert_eq!(engine.get_bed(1).unwrap().state, BedState::Occupied);
    }

    #[test]
    fn rate_window_must_be_ordered() {
        let (mut engine, _clock) = seeded();
        let result = engine.create_bed_rate(
            &admin(),
            NewBedRate {
                room_type: RoomType::General,
                daily_rate: Amount::from_scaled(10_000),
                effective_from: "2025-03-01".parse().unwrap(),
                effective_to: Some("2025-02-01".parse().unwrap()),
            },
        );
        assert!(matches!(
            result,
            Err(EngineError::Validation(ValidationError::InvertedRateWindow))
        ));
    }

    #[test]
    fn list_beds_filters_by_effective_state() {
        let (mut engine, clock) = seeded();
        engine
            .set_bed_state(
                &admin(),
                1,
                BedState::Reserved,
                Some(ts("2025-03-10T09:00:00Z")),
                None,
            )
            .unwrap();

        assert_eq!(engine.list_beds(None, Some(BedState::Reserved)).len(), 1);
        assert_eq!(engine.list_beds(None, Some(BedState::Vacant)).len(), 3);

        clock.advance_minutes(90);
        assert_eq!(engine.list_beds(None, Some(BedState::Reserved)).len(), 0);
        assert_eq!(engine.list_beds(None, Some(BedState::Vacant)).len(), 4);
    }
}
