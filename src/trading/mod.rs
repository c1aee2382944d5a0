//! Trading module for order construction and execution.
//!
//! This module handles:
//! - Order types and creation
//! - Order execution with retry and auditing
//! - OCO protection pairs

pub mod executor;
pub mod oco;
pub mod order;

pub use executor::{OrderExecutor, RetryPolicy};
pub use oco::{OcoPlan, OcoResult};
pub use order::{OcoLeg, OrderRequest, OrderResult, OrderStatus, OrderType, Side, TimeInForce};
