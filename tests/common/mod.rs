#![allow(dead_code)]

pub mod mock_store;
pub mod strategies;

pub use mock_store::*;
