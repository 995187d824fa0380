//! The brig
//!
//! A registry of members time-boxed into a restricted role, per guild, with a
//! periodic sweep that releases them when their sentence is over.

mod entry;
mod error;
pub mod gateway;
mod service;
mod store;

pub use entry::{BrigEntry, INDEFINITE_LABEL, WINDOW_FORMAT};
pub use error::{BrigError, BrigResult};
pub use gateway::{BrigGateway, SerenityGateway};
pub use service::{BrigService, SweepRequest};
pub use store::BrigStore;
