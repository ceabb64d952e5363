pub mod bnb;
pub mod codec;
pub mod comm;
pub mod config;
pub mod constants;
pub mod distributed;
pub mod error;
pub mod frontier;
pub mod incumbent;
pub mod knapsack;
pub mod message;
pub mod pool;
pub mod problem;
pub mod scheduler;
pub mod stats;
pub mod utils;

pub use bnb::{BnbSolver, Solution};
pub use config::SolverConfig;
pub use error::{Error, Result};
pub use problem::{Bounds, Feasibility, Goal, Problem, Score};
pub use scheduler::{SchedulerType, Solver};
