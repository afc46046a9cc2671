//! Ports consumed by the engine: capability checks and the patient directory.
//!
//! Every mutating operation is gated by one [`CapabilityCheck`] call at the
//! engine boundary. Permission evaluation itself lives outside the engine;
//! only the check contract is defined here.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::PatientId;

/// The caller of an operation, identified by an opaque id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ManageInventory,
    AdmitPatient,
    TransferCreate,
    TransferApprove,
    TransferComplete,
    TransferCancel,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::ManageInventory => "manage-inventory",
            Capability::AdmitPatient => "admit-patient",
            Capability::TransferCreate => "transfer.create",
            Capability::TransferApprove => "transfer.approve",
            Capability::TransferComplete => "transfer.complete",
            Capability::TransferCancel => "transfer.cancel",
        };
        f.write_str(name)
    }
}

pub trait CapabilityCheck: Send + Sync {
    fn allows(&self, actor: &Actor, capability: Capability) -> bool;
}

/// Grants everything. For deployments that enforce permissions upstream,
/// and for tests not exercising the gate.
pub struct AllowAll;

impl CapabilityCheck for AllowAll {
    fn allows(&self, _actor: &Actor, _capability: Capability) -> bool {
        true
    }
}

/// Fixed per-actor grant table.
#[derive(Default)]
pub struct StaticPolicy {
    grants: HashMap<String, HashSet<Capability>>,
}

impl StaticPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, actor_id: impl Into<String>, capability: Capability) -> Self {
        self.grants
            .entry(actor_id.into())
            .or_default()
            .insert(capability);
        self
    }
}

impl CapabilityCheck for StaticPolicy {
    fn allows(&self, actor: &Actor, capability: Capability) -> bool {
        self.grants
            .get(&actor.id)
            .is_some_and(|caps| caps.contains(&capability))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
}

/// The external patient/identity service.
pub trait PatientDirectory: Send + Sync {
    fn get_patient(&self, id: PatientId) -> Option<Patient>;
    fn search_patients(&self, query: &str) -> Vec<Patient>;
}

/// Resolves every nonzero id. For deployments where admissions arrive with
/// ids already validated upstream.
pub struct OpenPatientDirectory;

impl PatientDirectory for OpenPatientDirectory {
    fn get_patient(&self, id: PatientId) -> Option<Patient> {
        (id != 0).then(|| Patient {
            id,
            name: format!("patient-{id}"),
        })
    }

    fn search_patients(&self, _query: &str) -> Vec<Patient> {
        Vec::new()
    }
}

/// Seeded in-memory directory, used by the replay binary and tests.
#[derive(Default)]
pub struct InMemoryPatients {
    by_id: HashMap<PatientId, Patient>,
}

impl InMemoryPatients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, patient: Patient) {
        self.by_id.insert(patient.id, patient);
    }

    pub fn with_ids(ids: impl IntoIterator<Item = PatientId>) -> Self {
        let mut dir = Self::new();
        for id in ids {
            dir.insert(Patient {
                id,
                name: format!("patient-{id}"),
            });
        }
        dir
    }
}

impl PatientDirectory for InMemoryPatients {
    fn get_patient(&self, id: PatientId) -> Option<Patient> {
        self.by_id.get(&id).cloned()
    }

    fn search_patients(&self, query: &str) -> Vec<Patient> {
        let needle = query.to_lowercase();
        let mut found: Vec<Patient> = self
            .by_id
            .values()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        found.sort_by_key(|p| p.id);
        found
    }
}
