//! Typed view of the rule catalog: the logical-field taxonomy, the
//! decoded action variants carried by rule records, and the seed
//! vocabulary the service ships with.

pub mod actions;
pub mod fields;
pub mod seed;
