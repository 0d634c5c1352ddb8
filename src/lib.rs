// src/lib.rs

//! Incremental discussion board backup library

pub mod error;
pub mod models;
pub mod pipeline;
pub mod remote;
pub mod services;
pub mod storage;

#[cfg(test)]
mod testing;
