//! API request handlers, one module per resource.

pub mod access;
pub mod auth;
pub mod contracts;
pub mod exchange_rates;
pub mod health;
pub mod imports;
pub mod invoices;
pub mod rate_cards;
pub mod reports;
pub mod roles;
pub mod team_members;
pub mod timesheets;
pub mod users;
pub mod vendors;
