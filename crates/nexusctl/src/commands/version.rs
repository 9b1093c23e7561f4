pub fn execute() -> anyhow::Result<()> {
    println!("nexusctl {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
