mod commands;
mod intent;
mod lifecycle;
mod queries;
mod service;

pub use commands::MutationOutcome;
pub use intent::{MutationIntent, MutationKind};
pub use lifecycle::{LifecycleState, MutationController, MutationTicket};
pub use service::ContentService;
