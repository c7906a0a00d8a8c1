#![doc = include_str!("../README.md")]


pub(crate) mod types;
pub(crate) mod config;

pub mod merge;
pub mod gate;
pub mod verifier;
pub mod prelude;

#[cfg(any(test,doc))]
mod unit_test_utils;
