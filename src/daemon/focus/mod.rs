//! Focus tracking: turns idle time samples into focus and rest periods.

pub mod ledger;
pub mod machine;
pub mod state;
pub mod tracker;
