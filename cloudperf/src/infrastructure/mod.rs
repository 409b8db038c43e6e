pub mod catalog;
pub mod config;
pub mod repository;
pub mod service;
pub mod service_provider;
pub mod telemetry;
