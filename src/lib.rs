pub mod access;
pub mod amount;
pub mod clock;
pub mod csv;
pub mod engine;
pub mod model;

pub use access::{Actor, AllowAll, Capability, CapabilityCheck, InMemoryPatients, Patient, PatientDirectory};
pub use amount::Amount;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Engine, EngineError};
pub use model::{AdmissionId, BedId, BedState, Command, PatientId, TransferId};
