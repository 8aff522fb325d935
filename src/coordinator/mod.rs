mod command;
mod driver;
mod handle;
mod service;

pub use handle::{CameraSnapshot, CoordinatorHandle, SystemSnapshot};
pub use service::Coordinator;
