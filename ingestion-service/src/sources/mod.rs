pub mod api_batch;
pub mod csv_upload;
pub mod http_api;

pub use api_batch::{RawBatch, RawReading};
pub use csv_upload::CsvBatch;
