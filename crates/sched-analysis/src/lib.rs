#![doc = include_str!("../README.md")]

pub mod batch;
pub mod config;
pub mod entities;
pub mod error;
pub mod event;
pub mod metrics;
pub mod reconstruct;
pub mod report;
pub mod run;
pub mod solver_log;
pub mod stats;
pub mod trace;
pub mod utilization;

#[cfg(test)]
mod tests;
