use bnb::knapsack::Knapsack;
use std::{
    error::Error,
    io::{self, BufWriter, Write},
};

/// Prints a random knapsack instance with capacity at half the total weight.
pub fn generate(num_items: usize, seed: Option<u64>) -> Result<(), Box<dyn Error>> {
    let seed = seed.unwrap_or_else(|| fastrand::u64(..));
    let problem = Knapsack::random(num_items, &mut fastrand::Rng::with_seed(seed));

    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = BufWriter::new(handle);

    writeln!(
        writer,
        "c Random 0/1 knapsack, {} items, seed {}",
        num_items, seed
    )?;
    write!(writer, "{}", problem.to_instance_string())?;

    writer.flush()?;
    Ok(())
}
