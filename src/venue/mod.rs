pub mod auth;
pub mod rest;
pub mod types;
pub mod ws;
