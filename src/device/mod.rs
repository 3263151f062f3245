pub mod device;

pub use device::{configure_devices, DeviceInfo};
