pub mod types;
pub mod filter;
pub mod matcher;
pub mod planner;

pub use types::{QuerySpec, QueryType};
pub use planner::{QueryPlan, QueryPlanner};
