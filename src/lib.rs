pub mod asset;
pub mod audit;
pub mod config;
pub mod edit;
pub mod error;
pub mod ledger;
pub mod matcher;
pub mod permission;
pub mod service;
pub mod store;
pub mod utils;
pub mod workflow;
