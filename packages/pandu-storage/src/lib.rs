pub mod db;
pub mod embed_cache;
pub mod models;
pub mod qdrant;
pub mod routes;
pub mod schema;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
