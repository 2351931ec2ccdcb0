pub mod charger_reading_queries;
pub mod device_queries;
pub mod schema;
