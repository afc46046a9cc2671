//! Admission binder: one active admission per patient, bound to exactly one
//! bed at a time.
//!
//! Uniqueness is enforced through the `admitted_patients` index, not a
//! check-then-act scan, so a racing duplicate admission loses on the index
//! rather than slipping past a stale read.

use chrono::{DateTime, Utc};

use super::error::{
    AdmissionStatusLabel, ConflictError, EngineError, NotFound, PreconditionFailed, ValidationError,
};
use super::{Engine, next_id};
use crate::access::{Actor, Capability};
use crate::model::{
    Admission, AdmissionId, AdmissionPatch, AdmissionStatus, BedId, NewAdmission, PatientId,
    normalize_timestamp,
};

impl Engine {
    /// Admit a patient to a vacant bed.
    ///
    /// The bed is claimed vacant→occupied through the state-machine CAS, so
    /// of two concurrent admissions naming the same bed exactly one wins.
    pub fn create_admission(
        &mut self,
        actor: &Actor,
        new: NewAdmission,
    ) -> Result<Admission, EngineError> {
        self.authorize(actor, Capability::AdmitPatient)?;
        if new.patient_id == 0 {
            return Err(ValidationError::ZeroId("patient_id").into());
        }
        if new.bed_id == 0 {
            return Err(ValidationError::ZeroId("bed_id").into());
        }
        if self.patients.get_patient(new.patient_id).is_none() {
            return Err(NotFound::Patient(new.patient_id).into());
        }
        if let Some(&admission) = self.admitted_patients.get(&new.patient_id) {
            return Err(ConflictError::PatientAlreadyAdmitted {
                patient: new.patient_id,
                admission,
            }
            .into());
        }

        let admitted_at = new
            .admitted_at
            .map(normalize_timestamp)
            .unwrap_or_else(|| self.clock.now());
        if let Some(expected) = new.expected_discharge_at
            && normalize_timestamp(expected) < admitted_at
        {
            return Err(ValidationError::OutOfOrderTimestamp {
                field: "expected_discharge_at",
                anchor: "admitted_at",
            }
            .into());
        }

        let id = next_id(&mut self.ids.admission);
        // a losing claim must not burn the id
        self.claim_occupy(new.bed_id, id, None).inspect_err(|_| {
            self.ids.admission -= 1;
        })?;

        let admission = Admission {
            id,
            patient_id: new.patient_id,
            current_bed_id: new.bed_id,
            status: AdmissionStatus::Admitted,
            admitted_at,
            discharged_at: None,
            expected_discharge_at: new.expected_discharge_at.map(normalize_timestamp),
            attending_practitioner: new.attending_practitioner,
            diagnosis: new.diagnosis,
            payor: new.payor,
        };
        self.admissions.insert(id, admission.clone());
        self.admitted_patients.insert(new.patient_id, id);
        Ok(admission)
    }

    pub fn get_admission(&self, id: AdmissionId) -> Option<&Admission> {
        self.admissions.get(&id)
    }

    pub fn list_admissions(
        &self,
        status: Option<AdmissionStatus>,
        patient_id: Option<PatientId>,
    ) -> Vec<Admission> {
        let mut admissions: Vec<Admission> = self
            .admissions
            .values()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .filter(|a| patient_id.is_none_or(|p| a.patient_id == p))
            .cloned()
            .collect();
        admissions.sort_by_key(|a| a.id);
        admissions
    }

    /// Metadata-only mutation; never touches bed state.
    pub fn update_admission(
        &mut self,
        actor: &Actor,
        id: AdmissionId,
        patch: AdmissionPatch,
    ) -> Result<Admission, EngineError> {
        self.authorize(actor, Capability::AdmitPatient)?;

        let admission = self.admissions.get_mut(&id).ok_or(NotFound::Admission(id))?;
        if admission.status == AdmissionStatus::Cancelled {
            return Err(PreconditionFailed::AdmissionStatus {
                admission: id,
                status: AdmissionStatusLabel(admission.status),
            }
            .into());
        }
        if let Some(expected) = patch.expected_discharge_at {
            let expected = normalize_timestamp(expected);
            if expected < admission.admitted_at {
                return Err(ValidationError::OutOfOrderTimestamp {
                    field: "expected_discharge_at",
                    anchor: "admitted_at",
                }
                .into());
            }
            admission.expected_discharge_at = Some(expected);
        }
        if let Some(practitioner) = patch.attending_practitioner {
            admission.attending_practitioner = Some(practitioner);
        }
        if let Some(diagnosis) = patch.diagnosis {
            admission.diagnosis = Some(diagnosis);
        }
        if let Some(payor) = patch.payor {
            admission.payor = Some(payor);
        }
        Ok(admission.clone())
    }

    /// Cancel an admission, releasing its bed. Idempotent on an already
    /// cancelled admission; conflicts while a transfer is mid-flight.
    pub fn cancel_admission(
        &mut self,
        actor: &Actor,
        id: AdmissionId,
    ) -> Result<Admission, EngineError> {
        self.authorize(actor, Capability::AdmitPatient)?;
        self.close_admission(id, AdmissionStatus::Cancelled, None)
    }

    /// Discharge an admission, releasing its bed. Idempotent on an already
    /// discharged admission.
    pub fn discharge_admission(
        &mut self,
        actor: &Actor,
        id: AdmissionId,
        discharged_at: Option<DateTime<Utc>>,
    ) -> Result<Admission, EngineError> {
        self.authorize(actor, Capability::AdmitPatient)?;
        let at = discharged_at
            .map(normalize_timestamp)
            .unwrap_or_else(|| self.clock.now());
        self.close_admission(id, AdmissionStatus::Discharged, Some(at))
    }

    fn close_admission(
        &mut self,
        id: AdmissionId,
        target: AdmissionStatus,
        discharged_at: Option<DateTime<Utc>>,
    ) -> Result<Admission, EngineError> {
        let admission = self.admissions.get(&id).ok_or(NotFound::Admission(id))?;
        if admission.status == target {
            // client retry storms tolerate a repeat close
            return Ok(admission.clone());
        }
        if admission.status != AdmissionStatus::Admitted {
            return Err(PreconditionFailed::AdmissionStatus {
                admission: id,
                status: AdmissionStatusLabel(admission.status),
            }
            .into());
        }
        if let Some(&transfer) = self.open_transfers.get(&id) {
            return Err(ConflictError::TransferInFlight {
                admission: id,
                transfer,
            }
            .into());
        }
        if let Some(at) = discharged_at
            && at < admission.admitted_at
        {
            return Err(ValidationError::OutOfOrderTimestamp {
                field: "discharged_at",
                anchor: "admitted_at",
            }
            .into());
        }

        let bed_id = admission.current_bed_id;
        let patient_id = admission.patient_id;
        self.vacate_bed(bed_id);
        self.admitted_patients.remove(&patient_id);

        let admission = self.admissions.get_mut(&id).ok_or(NotFound::Admission(id))?;
        admission.status = target;
        admission.discharged_at = discharged_at;
        Ok(admission.clone())
    }

    /// The transfer-completion commit runs through here so the bed flip and
    /// the `current_bed_id` rebind land in the same atomic unit.
    pub(crate) fn rebind_admission_bed(&mut self, id: AdmissionId, bed_id: BedId) {
        if let Some(admission) = self.admissions.get_mut(&id) {
            admission.current_bed_id = bed_id;
        }
    }
}
