//! `parlor init`: first-time setup.

use parlor_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Parlor: first-time setup");
    println!("========================\n");

    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        println!("  Created config directory: {}", dir.display());
    }

    if config_path.exists() {
        println!("  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run init.\n");
    } else {
        std::fs::write(config_path, AppConfig::default_toml())?;
        println!("  Created config at: {}", config_path.display());
    }

    let mut config = AppConfig::load_from(config_path)?;
    config.apply_env();
    let data_dir = config.data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        println!("  Created data directory: {}", data_dir.display());
    }

    println!("\n  Next steps:");
    println!("   1. Set PARLOR_API_KEY or add api_key to {}", config_path.display());
    println!("   2. Run: parlor chat --persona 1");
    println!();

    Ok(())
}
