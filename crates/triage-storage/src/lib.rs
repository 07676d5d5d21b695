pub mod db;
pub mod models;
pub mod qdrant;
pub mod schema;
pub mod tickets;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
