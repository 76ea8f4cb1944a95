//! Focus tracker that watches your input activity and reminds you to take a break.
//! A daemon counts focused seconds per minute and per hour, and the cli reads what it saved.
//!

pub mod cli;
pub mod daemon;
pub mod fs;
pub mod input_api;
pub mod utils;
