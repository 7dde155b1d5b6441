pub mod amplitude;
pub mod analysis;
pub mod decode;
pub mod device;
pub mod filter;
pub mod frame;
#[cfg(feature = "live")]
pub mod live;
pub mod window;
