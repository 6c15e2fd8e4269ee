pub mod device;
pub mod signal;
pub mod transport;
