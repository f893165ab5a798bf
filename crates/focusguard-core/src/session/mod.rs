//! Session state machine and the persisted session record.

mod machine;
mod model;

pub use machine::{MachineOptions, SessionCollaborators, SessionMachine};
pub use model::{session_id_from_deadline, Session, SessionKind, SessionState, DEADLINE_PREFIX};
