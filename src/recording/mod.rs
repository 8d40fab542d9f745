//! Recording lifecycle: state, the background writer and the manager.

mod builder;
mod manager;
mod status;
mod writer;

pub use builder::RecordingManagerBuilder;
pub use manager::RecordingManager;
pub use status::{RecordingState, RecordingStatus};
