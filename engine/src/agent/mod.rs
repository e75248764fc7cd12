//! Agent Loop
//!
//! This module turns one queued task into a reply. The planner decides the
//! next action, the dispatcher runs it, and the result is fed back until the
//! planner is done or the iteration budget is spent.

pub mod core;
pub mod plan;
pub mod planner;
pub mod processor;

pub use core::{observation, AgentLoop, AgentResponse, DEFAULT_REPLY, MAX_ITERATIONS_REPLY};
pub use plan::{decode_plan, Plan, PlanDecode};
pub use planner::Planner;
pub use processor::{AgentTaskProcessor, ReplySink};
