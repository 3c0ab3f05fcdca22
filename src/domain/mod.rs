//! Domain model: pure types and rules, no I/O.
pub mod analytics;
pub mod catalog;
pub mod events;
pub mod inventory;
pub mod location;
pub mod value_objects;
