use adaptir::grid::{Grid, GridMode};
use rand_pcg::Pcg64;

fn main() {
    let mut rng = Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96);
    let mut grid = Grid::<f64>::new(vec![0.0], vec![1.0], 16, GridMode::Cumulant);

    // Train the grid a little
    for i in 0..1000 {
        let value = grid
            .generate(&mut rng)
            .map(|weight| weight * grid.point()[0].powi(4))
            .unwrap_or(0.0);
        grid.update(value);

        if i % 100 == 99 {
            grid.adapt();
        }
    }

    // Serialize the random number generator and the grid
    let serialized_rng = serde_json::to_string(&rng).unwrap();
    let serialized_grid = grid.to_state_string();
    println!("Serialized RNG: {}", serialized_rng);
    println!("Serialized grid:\n{}", serialized_grid);

    // Deserialize them
    let mut deserialized_rng: rand_pcg::Lcg128Xsl64 = serde_json::from_str(&serialized_rng).unwrap();
    let mut deserialized_grid = Grid::<f64>::from_state_str(&serialized_grid).unwrap();

    // Check whether serialized and deserialized give the same point.
    let w_original = grid.generate(&mut rng).unwrap();
    let w_deserial = deserialized_grid.generate(&mut deserialized_rng).unwrap();

    println!("x from original        : {} (weight {})", grid.point()[0], w_original);
    println!(
        "x from deserialized    : {} (weight {})",
        deserialized_grid.point()[0],
        w_deserial
    );
}
