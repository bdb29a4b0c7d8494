pub mod clients;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod models;
pub mod routing;
pub mod service;
pub mod shutdown;
pub mod worker;
