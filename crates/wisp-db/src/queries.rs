//! Database query functions organized by domain.

pub mod nodes;
pub mod points;
pub mod proofs;
pub mod settings;
pub mod settlements;
pub mod users;
