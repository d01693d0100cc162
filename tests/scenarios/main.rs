//! Scenario-based tests for conveyor

mod helpers;

mod always_run;
mod gating;
mod notifications;
mod parallel_groups;
mod parameters;
mod precedence;
mod retry_behavior;
