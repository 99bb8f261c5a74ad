pub mod app;
pub mod cli;
pub mod config;
pub mod draft;
pub mod errors;
pub mod export;
pub mod gateway;
pub mod lint;
pub mod log;
pub mod prompt;
pub mod provider;
pub mod schema;
pub mod session;
pub mod storage;
pub mod ux;
pub mod wire;

#[cfg(test)]
mod testing;
