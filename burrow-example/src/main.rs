use burrow::Database;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = Database::default_path();
    log::info!("Using store at {}", path.display());

    let report = burrow_example::run_demo(&path)?;
    println!("name of dog: {}", report.standalone_name);
    println!("number of dogs with an x: {}", report.dogs_with_x);
    println!("of those, older than 8: {}", report.old_dogs_with_x);
    println!("dogs owned by Tim: {}", report.person_dogs);
    println!("dogs named like Rex, seen from a background thread: {}", report.background_rex);
    Ok(())
}
