pub mod availability_endpoint;
pub mod import_endpoint;
pub mod status_endpoint;
