//! Stdin controls and the service list printed for the operator.

pub mod commands;
pub mod presenter;
