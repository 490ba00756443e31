//! Show or initialize the application config file.

use trackrefine_common::config::{config_file_path, AppConfig};

pub fn run(init: bool, app: &AppConfig) -> anyhow::Result<()> {
    let path = config_file_path();

    if init {
        if path.exists() {
            println!("Config already exists at: {}", path.display());
        } else {
            AppConfig::default()
                .save()
                .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))?;
            println!("Wrote default config to: {}", path.display());
        }
        return Ok(());
    }

    println!("Config file: {}", path.display());
    if !path.exists() {
        println!("  (not present, using defaults)");
    }
    println!("{}", serde_json::to_string_pretty(app)?);
    Ok(())
}
