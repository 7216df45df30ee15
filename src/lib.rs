pub mod capture_management;
pub mod configuration;
pub mod data_capture;
pub mod error_handling;
pub mod storage;
pub mod thumbnail;
