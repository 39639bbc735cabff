//! Optimistic delivery confirmation via hub echo.

mod tracker;

pub use tracker::{Correlation, DeliveryTracker, PendingMessage, TimeoutHandler};
