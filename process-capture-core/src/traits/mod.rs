pub mod capture_channel;
pub mod device_activator;
