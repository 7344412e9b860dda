pub mod client;
pub mod config;
pub mod converter;
pub mod error;
pub mod models;
pub mod poller;
pub mod resource_data;
pub mod resources;
pub mod scope;
pub mod state;
