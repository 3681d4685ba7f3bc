//! sea-orm entities for the `campaigns` and `email_configs` tables.

pub mod campaign;
pub mod email_config;
