use bnb::{
    config::SolverConfig, constants::KNAPSACK_WORST_BOUND, knapsack::parse_knapsack,
    problem::Goal, scheduler::SchedulerType, scheduler::Solver,
};
use std::io::Read;

/// Reads one knapsack instance from stdin and prints its optimum.
pub fn main() -> Result<(), String> {
    let mut data = Vec::new();
    std::io::stdin()
        .read_to_end(&mut data)
        .map_err(|e| format!("Failed to read from stdin: {}", e))?;

    let problem =
        parse_knapsack(&data).map_err(|e| format!("Failed to parse knapsack instance: {}", e))?;

    let solver = Solver::new(SchedulerType::WorkStealing, SolverConfig::default())
        .map_err(|e| e.to_string())?;
    let solution = solver
        .solve(&problem, Goal::Maximize, KNAPSACK_WORST_BOUND)
        .map_err(|e| e.to_string())?;

    match solution.subproblem {
        None => println!("s NO SOLUTION"),
        Some(best) => {
            println!("s OPTIMUM {}", best.value);
            print!("v");
            for index in problem.selected_items(&best) {
                print!(" {}", index + 1);
            }
            println!();
        }
    }

    Ok(())
}
