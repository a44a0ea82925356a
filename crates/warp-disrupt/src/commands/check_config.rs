use std::path::Path;

use warpgrid_disruption::DisruptionConfig;

pub fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = DisruptionConfig::from_file(path)?;
    println!("✓ {} is valid", path.display());
    println!();
    print!("{}", config.to_toml_string()?);
    Ok(())
}
