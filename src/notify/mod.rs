mod dispatcher;
mod push;

pub use dispatcher::{geofence_tier, DispatchPass, DispatchTask, NotificationDispatcher};
pub use push::{ExpoPushGateway, PushGateway};
