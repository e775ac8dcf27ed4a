pub mod cache;
pub mod http;
pub mod memory;
pub mod observability;
pub mod persistence;
pub mod providers;
pub mod runtime;
pub mod workers;
