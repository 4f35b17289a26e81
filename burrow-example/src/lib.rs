//! The Dog/Person walkthrough: write a dog, query and refine, link it from a
//! person, then read it back from another thread.

use burrow::{BurrowError, Config, Database};
use std::path::Path;

include!(concat!(env!("OUT_DIR"), "/generated.rs"));

/// What the walkthrough observed at each step.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoReport {
    pub standalone_name: String,
    pub dogs_with_x: usize,
    pub old_dogs_with_x: usize,
    pub person_dogs: usize,
    pub background_rex: usize,
}

pub fn open(path: &Path) -> burrow::Result<Database> {
    Database::open(Config::new(path).schema(schema()?))
}

/// Run the walkthrough against the store at `path`, starting from an empty file.
pub fn run_demo(path: &Path) -> burrow::Result<DemoReport> {
    // Start fresh. A missing file is fine and so is anything else; the open
    // below reports real problems.
    let _ = Database::delete_files(path);

    let mut mydog = Dog {
        name: "Rex".to_string(),
        age: 9,
        ..Default::default()
    };
    let standalone_name = mydog.name.clone();
    log::info!("Name of dog: {standalone_name}");

    let db = open(path)?;
    db.write(|tx| tx.add(&mut mydog))?;

    let dogs = db.objects_where::<Dog>("name contains 'x'")?;
    let old_dogs = dogs.filter("age > 8")?;
    let dogs_with_x = dogs.count()?;
    let old_dogs_with_x = old_dogs.count()?;
    log::info!("Number of dogs: {dogs_with_x}, older than 8: {old_dogs_with_x}");

    let mut person = Person {
        name: "Tim".to_string(),
        ..Default::default()
    };
    person.dogs.push(&mydog)?;
    db.write(|tx| tx.add(&mut person))?;

    let background_path = path.to_path_buf();
    let background_rex = std::thread::spawn(move || -> burrow::Result<usize> {
        let db = open(&background_path)?;
        let rex = db.objects_where::<Dog>("name contains 'Rex'")?.count()?;
        log::info!("Number of dogs from the background: {rex}");
        Ok(rex)
    })
    .join()
    .map_err(|_| BurrowError::Other("background query panicked".to_string()))??;

    Ok(DemoReport {
        standalone_name,
        dogs_with_x,
        old_dogs_with_x,
        person_dogs: person.dogs.len(),
        background_rex,
    })
}
