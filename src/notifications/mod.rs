pub mod config;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod payload;
pub mod priority;
pub mod service;
pub mod translator;
