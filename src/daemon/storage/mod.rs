//!  Storage is organized through [activity_storage::FileActivityStorage].
//!  The basic idea is:
//!   - There is an application directory with three json files.
//!   - `activity.json` holds the live minute data of the current hour.
//!   - `daily_activities.json` holds every day ever recorded, written as a whole.
//!   - `config.json` holds user settings.
//!  Every file is decoded leniently, broken data falls back to defaults field by field.

pub mod activity_storage;
pub mod daily_store;
pub mod entities;
