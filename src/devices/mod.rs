pub mod database;
pub mod entities;
pub mod error;
pub mod service;

mod router;

pub use router::router;
