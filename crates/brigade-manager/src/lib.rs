//! brigade-manager — the system manager role.
//!
//! A thin consumer of the same bus events the workers exchange: it keeps
//! a global directory of live workers, answers "can this route be
//! serviced right now" for every job it sees, and periodically asks the
//! population to re-announce so the directory heals after restarts. It
//! takes no part in the coordination algorithm itself.

pub mod directory;
pub mod manager;

pub use directory::WorkerDirectory;
pub use manager::{ManagerError, ManagerHandle, SystemManager};
