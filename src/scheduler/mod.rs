pub mod periodic;
pub mod timer;

pub use periodic::{publish_every, uptime_publisher};
pub use timer::*;
