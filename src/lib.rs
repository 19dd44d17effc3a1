//! Rigger: declarative provisioning plans.
//!
//! A plan is an ordered list of tasks that pass named values to each other
//! through `${name}` references. Provisioning tasks shell out to an external
//! tool and record what they built, including partial outcomes, in a
//! versioned local directory.

pub mod cli;
pub mod core;
pub mod directory;
pub mod tasks;
pub mod transport;
