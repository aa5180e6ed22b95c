pub mod account;
pub mod auth;
pub mod ephemeral;
pub mod session;
pub mod users;

pub use account::{AccountService, Delivery, LinkSettings, NewAccount};
pub use auth::{AuthService, LogoutOutcome};
pub use ephemeral::{Consumption, EphemeralTokenLedger};
pub use session::SessionStore;
pub use users::UserDirectory;
