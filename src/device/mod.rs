pub mod btle;
pub mod cache;
pub mod constants;
pub mod driver;
pub mod profiles;
pub mod protocol;
pub mod translator;
pub mod transport;
pub mod types;
