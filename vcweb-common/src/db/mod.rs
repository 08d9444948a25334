//! Database setup and user rows

pub mod init;
pub mod users;

pub use init::*;
pub use users::*;
