//! Stream combinators for change subscriptions

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
