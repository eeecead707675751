pub mod btle;
pub mod capability;
pub mod connection;
pub mod constants;
pub mod handle;
pub mod transport;
pub mod types;

#[cfg(test)]
pub mod mock;
