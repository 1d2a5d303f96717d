//! `parlor doctor`: diagnose configuration and provider health.

use parlor_config::AppConfig;
use parlor_core::provider::Provider;
use std::path::Path;

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Parlor doctor: system diagnostics");
    println!("=================================\n");

    let mut issues = 0;

    // Check config
    let config = if config_path.exists() {
        match AppConfig::load_from(config_path) {
            Ok(mut config) => {
                config.apply_env();
                println!("  [ok]   Config file valid: {}", config_path.display());
                config
            }
            Err(e) => {
                println!("  [fail] Config file invalid: {e}");
                println!("\n  1 issue found. Fix the config and run doctor again.");
                return Ok(());
            }
        }
    } else {
        println!("  [warn] No config file, using defaults. Run `parlor init`");
        issues += 1;
        let mut config = AppConfig::default();
        config.apply_env();
        config
    };

    // Check data directory
    let data_dir = config.data_dir();
    if data_dir.is_dir() {
        let personas = parlor_store::list_personas(&data_dir)?;
        println!("  [ok]   Data directory: {} ({} personas)", data_dir.display(), personas.len());
    } else {
        println!("  [warn] No data directory at {}. Run `parlor init`", data_dir.display());
        issues += 1;
    }

    // Check provider
    match parlor_providers::build_from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  [ok]   Provider '{}' reachable", provider.name()),
            Ok(false) => {
                println!("  [warn] Provider '{}' answered but is not healthy", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  [fail] Provider '{}' unreachable: {e}", provider.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  [fail] Provider not configured: {e}");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
