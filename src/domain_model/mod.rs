mod claims;
mod token;
mod user;

pub use claims::*;
pub use token::*;
pub use user::*;
