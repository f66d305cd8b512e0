pub mod temperature;

pub use temperature::{classify, format_temperature, is_temperature_alert, TemperatureStatus};
