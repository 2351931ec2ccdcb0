mod charger_reading;

pub use charger_reading::{ChargerReading, NOT_SET_IP};
