pub mod auth;
pub mod market;
pub mod ticker;
pub mod trade;
