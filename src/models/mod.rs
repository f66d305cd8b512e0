pub mod events;
pub mod reading;
pub mod shipment;
pub mod telemetry;

pub use events::ChangeEvent;
pub use reading::{NewReading, TemperatureReading};
pub use shipment::{NewShipment, Shipment, ShipmentStatus};
