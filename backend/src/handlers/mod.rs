pub mod account;
pub mod auth;
pub mod health;
pub mod users;

pub use account::*;
pub use auth::*;
pub use health::*;
pub use users::*;
