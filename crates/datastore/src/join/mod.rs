//! Join planning and reassembly
//!
//! - `planner`: decomposes a find with associations into parent and child statements
//! - `cache`: folds the flat result sets back into nested records

pub mod cache;
pub mod planner;

pub use cache::QueryCache;
pub use planner::{
    Association, Cardinality, ChildStatement, ChildStrategy, DefaultJoinPlanner, JoinInstructions,
    JoinPlan, JoinPlanner, PlannerConfig,
};
