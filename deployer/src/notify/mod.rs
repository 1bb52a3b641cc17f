//! Outcome notifications

pub mod dispatcher;
pub mod message;
pub mod transport;

pub use dispatcher::{Delivery, Dispatcher, RetryPolicy};
pub use message::{clip, ButtonStyle, ContentBlock, Message, MessageError, MAX_TEXT_LEN};
