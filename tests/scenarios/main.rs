//! Scenario-based tests for conveyor

mod helpers;

mod concurrent_guard;
mod failure_handling;
mod resolution;
mod resume_behavior;
mod success_chain;
