//! Device tree node model and resource claims (memory-mapped register
//! windows, IRQ lines) handed out to drivers during bus probe.

pub mod resource;
pub mod tree;

pub use resource::{IoMem, IrqResource, Resource};
pub use tree::{DeviceNode, DeviceTree};
