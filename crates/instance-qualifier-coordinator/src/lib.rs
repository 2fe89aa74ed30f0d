//! instance-qualifier-coordinator - Result collection and reporting
//!
//! This crate drives the result-collection side of an instance qualification
//! run: it polls every benchmarked instance's result artifact in parallel,
//! merges arrivals into the run-wide aggregated result set, reconciles the
//! set with CloudWatch utilization data, and renders the final pass/fail
//! table per instance type.
//!
//! Provisioning, agent execution, and bucket lifecycle live outside this
//! crate; they are consumed through the collaborator traits in
//! [`interfaces`].

pub mod aws;
pub mod collector;
pub mod config;
pub mod error;
pub mod interfaces;
