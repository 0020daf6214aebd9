// Provisioning entry points
pub mod batch;
pub mod deploy;
pub mod resize;
