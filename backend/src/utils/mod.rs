pub mod email;
pub mod jwt;
pub mod password;
pub mod time;

pub use jwt::{Claims, TokenCodec, TokenError, TokenKind};
pub use password::*;
pub use time::*;
