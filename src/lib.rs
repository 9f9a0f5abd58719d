pub mod config;
pub mod engine;
pub mod execution;
pub mod feed;
pub mod runner;
pub mod venue;
