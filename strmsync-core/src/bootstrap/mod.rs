pub mod database;
pub mod services;

pub use database::init_database;
pub use services::{init_services, shutdown_services, Services};
