pub mod dispatch;
pub mod local;
pub mod message;

pub use dispatch::Dispatcher;
pub use local::*;
pub use message::*;
