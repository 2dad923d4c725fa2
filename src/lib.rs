pub mod catalog;
pub mod config;
pub mod enrich;
pub mod extract;
pub mod http;
pub mod pool;
pub mod pricing;
pub mod progress;
pub mod store;
pub mod warning;

#[cfg(test)]
mod tests;
