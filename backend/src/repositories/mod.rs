pub mod memory;
pub mod session;
pub mod user;

pub use memory::InMemoryStore;
pub use session::{PgSessionRepository, SessionRepository};
pub use user::{PgUserStore, UserStore};
