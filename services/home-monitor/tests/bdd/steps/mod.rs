//! BDD step definitions for the home monitor service

pub mod session_steps;
pub mod throttle_steps;
pub mod view_steps;
