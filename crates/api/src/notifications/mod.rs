//! Delivery of broker notifications to live client connections.

mod router;

pub use router::NotificationRouter;
