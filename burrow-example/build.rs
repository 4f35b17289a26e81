use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=schema.yaml");
    let out_dir = std::env::var("OUT_DIR")?;
    let output = Path::new(&out_dir).join("generated.rs");
    burrow_codegen::generate_from_schema("schema.yaml", &output.to_string_lossy())?;
    Ok(())
}
