pub mod dispatcher;
pub mod push;

pub use dispatcher::{DispatchReport, Dispatcher, MissingDestinationPolicy, DEFAULT_SAFETY_MARGIN};
pub use push::{HttpPushChannel, PushChannel};
