pub mod app_state;
pub mod bootstrap;
pub mod config;
pub mod consumers;
pub mod db;
pub mod error;
pub mod events;
pub mod gateway;
pub mod models;
pub mod schema;
pub mod services;
pub mod store;

pub use error::{CheckoutError, ErrorKind};
