// ProtonTPR Output Layer
// Capability mirroring and the uinput virtual device

mod mirror;
mod uinput;

pub use mirror::{mirror_capabilities, VirtualDeviceSpec, DEFAULT_VIRTUAL_NAME};
pub use uinput::{check_registrable, VirtualDevice, REGISTRABLE_TYPES};
