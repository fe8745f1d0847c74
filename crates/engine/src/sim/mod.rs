//! Reference platform adapter used by the demo binary and the test suites.

mod host;
mod scheduler;
mod server;

pub use host::{EntityIdAllocator, SimEntity, SimHost, SimViewer};
pub use scheduler::TickScheduler;
pub use server::{SimServer, StepReport};
