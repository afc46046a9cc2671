//! Bed-charge preview: prices the day-by-day occupancy timeline of an
//! admission against the rate table.

use chrono::NaiveDate;

use super::error::{EngineError, NotFound};
use super::Engine;
use crate::Amount;
use crate::model::{
    AdmissionId, AdmissionStatus, BedId, ChargeDay, ChargePreview, RoomType, TransferStatus,
};

impl Engine {
    /// Walk the admission's occupancy timeline from admission (or
    /// `from_date`) through discharge, `to_date` or today, pricing each
    /// calendar day at the rate effective for the occupied room type.
    ///
    /// A day with a mid-day transfer is billed to the bed the patient ends
    /// the day in. Days without a matching rate row price at zero and are
    /// counted in `missing_rate_days`; among overlapping rate rows the most
    /// recently created wins.
    pub fn preview_bed_charges(
        &self,
        admission_id: AdmissionId,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    ) -> Result<ChargePreview, EngineError> {
        let admission = self
            .admissions
            .get(&admission_id)
            .ok_or(NotFound::Admission(admission_id))?;

        let mut preview = ChargePreview {
            admission_id,
            days: Vec::new(),
            total_amount: Amount::ZERO,
            missing_rate_days: 0,
        };
        // a cancelled admission is voided, nothing to bill
        if admission.status == AdmissionStatus::Cancelled {
            return Ok(preview);
        }

        // (effective-from, bed) segments: admission start plus each
        // completed transfer at its bed-change time
        let mut moves: Vec<_> = self
            .transfers
            .values()
            .filter(|t| t.admission_id == admission_id && t.status == TransferStatus::Completed)
            .filter_map(|t| Some((t.completed_at?, t.to_bed_id?)))
            .collect();
        moves.sort_by_key(|(at, _)| *at);

        let initial_bed = self
            .transfers
            .values()
            .filter(|t| t.admission_id == admission_id && t.status == TransferStatus::Completed)
            .min_by_key(|t| t.completed_at)
            .map(|t| t.from_bed_id)
            .unwrap_or(admission.current_bed_id);
        let mut events = vec![(admission.admitted_at, initial_bed)];
        events.extend(moves);

        let start = {
            let admitted = admission.admitted_at.date_naive();
            from_date.map_or(admitted, |f| f.max(admitted))
        };
        let mut end = admission
            .discharged_at
            .map_or_else(|| self.clock.now().date_naive(), |d| d.date_naive());
        if let Some(to) = to_date {
            end = end.min(to);
        }

        let mut day = start;
        while day <= end {
            let bed_id = events
                .iter()
                .rev()
                .find(|(at, _)| at.date_naive() <= day)
                .map(|(_, bed)| *bed)
                .unwrap_or(initial_bed);
            let room_type = self.room_type_of(bed_id)?;
            let rate = self.rate_for(room_type, day);
            let rate = match rate {
                Some(amount) => amount,
                None => {
                    preview.missing_rate_days += 1;
                    Amount::ZERO
                }
            };
            preview.total_amount += rate;
            preview.days.push(ChargeDay {
                date: day,
                room_type,
                bed_id,
                rate,
            });

            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }

        Ok(preview)
    }

    fn room_type_of(&self, bed_id: BedId) -> Result<RoomType, EngineError> {
        let bed = self.beds.get(&bed_id).ok_or(NotFound::Bed(bed_id))?;
        let room = self
            .rooms
            .get(&bed.room_id)
            .ok_or(NotFound::Room(bed.room_id))?;
        Ok(room.room_type)
    }

    /// The rate effective for a room type on a given day; among overlapping
    /// rows the highest id (most recently created) wins, deterministically.
    fn rate_for(&self, room_type: RoomType, day: NaiveDate) -> Option<Amount> {
        self.rates
            .values()
            .filter(|r| r.room_type == room_type)
            .filter(|r| r.effective_from <= day)
            .filter(|r| r.effective_to.is_none_or(|to| day <= to))
            .max_by_key(|r| r.id)
            .map(|r| r.daily_rate)
    }
}
