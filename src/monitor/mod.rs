pub mod alert_store;
pub mod notification;
pub mod propagator;
pub mod readings_view;

pub use alert_store::{ActiveAlerts, AlertEntry};
pub use notification::{Notification, NotificationKind, Notifier};
pub use propagator::{AlertPropagator, Command, MonitorHandle};
pub use readings_view::ReadingsView;
