//! Stream combinators for frame subscriptions

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
