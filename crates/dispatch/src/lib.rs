pub mod consumer;
pub mod producer;

pub use consumer::{Consumer, ConsumerHandle, ConsumerTarget};
pub use producer::{FanOut, Producer, StopHandle};
