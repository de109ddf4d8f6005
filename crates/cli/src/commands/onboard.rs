//! `threadmind onboard`: first-time setup.

use std::path::Path;
use threadmind_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();

    println!("Threadmind First-Time Setup");
    println!("===========================\n");

    if write_default_config(&config_dir)? {
        let config_path = config_dir.join("config.toml");
        println!("Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("   1. Edit {} and add your API key", config_path.display());
        println!("      (or set THREADMIND_API_KEY / OPENAI_API_KEY)");
        println!("   2. Run: threadmind chat\n");
    } else {
        println!(
            "Config already exists at: {}",
            config_dir.join("config.toml").display()
        );
        println!("   Edit it manually or delete and re-run onboard.\n");
    }

    Ok(())
}

/// Write `config.toml` into `dir` unless it already exists.
///
/// Returns `true` when a new file was written.
fn write_default_config(dir: &Path) -> std::io::Result<bool> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("config.toml");
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    Ok(true)
}
