//! Debt Service - Client debt tracking and oldest-first payment settlement.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;
