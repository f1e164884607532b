//! Terminal front end for the planning engine
//!
//! The engine orchestrates:
//! 1. Loading - Build a stack from its file, the environment and saved state
//! 2. Diffing - Display the plan against what was last applied
//! 3. Executing - Apply with a progress bar and confirmation prompt

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{ApplyOptions, execute};
pub use planner::LoadedStack;
