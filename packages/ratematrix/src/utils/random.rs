use rand::SeedableRng;
use rand_isaac::Isaac64Rng;

/// Creates the random number generator used for simulation.
///
/// Pass a seed to get a reproducible stream.
pub fn get_random_number_generator(seed: Option<u64>) -> Isaac64Rng {
  match seed {
    None => Isaac64Rng::from_entropy(),
    Some(seed) => Isaac64Rng::seed_from_u64(seed),
  }
}
