#![forbid(unsafe_code)]

pub mod app;
pub mod audit;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod notification;
pub mod providers;
pub mod status;
pub mod validate;

pub use error::{DeliveryError, Error};

pub(crate) mod api;
