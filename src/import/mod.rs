//! CSV bulk import.

pub mod timesheets;
