pub mod connection;
pub mod models;
pub mod repositories;

pub use connection::*;
pub use models::*;
pub use repositories::*;

pub type UserId = i64;
pub type PollId = i64;
pub type OptionId = i64;
