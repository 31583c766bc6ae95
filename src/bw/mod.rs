/// Typed vault tool commands.
pub mod client;
/// Process executor abstraction.
pub mod executor;
/// Session token, password channel, and scoped logout.
pub mod session;

pub use client::{BwClient, ListKind};
pub use executor::{BwExecutor, BwOutput, SystemBwExecutor};
pub use session::{PasswordChannel, SessionGuard, SessionState, SessionToken};
