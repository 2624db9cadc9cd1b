//! CLI command implementations.

pub mod apply;
pub mod category;
pub mod inspect;
pub mod journal;
pub mod lease;
