//! sea-orm entities for the credential and grant tables.

pub mod oauth2_access_token;
pub mod oauth2_authorization;
pub mod oauth2_client;
pub mod oauth2_refresh_token;
pub mod user;
