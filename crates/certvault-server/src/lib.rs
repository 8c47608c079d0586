//! Certvault server - configuration, logging and the demo HTTP surface
//! around the SQL certificate store.

pub mod api;
pub mod config;
pub mod startup;
