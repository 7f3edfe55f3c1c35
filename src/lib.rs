pub mod agent;
pub mod analysis;
pub mod config;
pub mod console;
pub mod error;
pub mod exit_codes;
pub mod platform;
pub mod storage;
pub mod workflow;

#[cfg(test)]
mod test_support;
