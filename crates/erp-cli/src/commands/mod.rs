pub mod auth;
pub mod devices;
pub mod discovery;
pub mod ext_auth;
