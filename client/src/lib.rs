//! Client side of the verdict service: a typed HTTP client, the optimistic
//! history cache that backs the dashboard, and the notification queue the
//! dashboard reports outcomes to.

pub mod api;
pub mod notification;
pub mod sync;
pub mod view;
