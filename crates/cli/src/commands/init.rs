//! `deskhand init` - write a default config and create the workspace.

use deskhand_config::AppConfig;
use std::path::Path;

use crate::runtime::config_file;

pub fn run(config_path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let config_path = config_file(config_path);

    println!("deskhand - first-time setup");
    println!("===========================\n");

    if let Some(dir) = config_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("  Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() && !force {
        println!("  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or re-run with --force to overwrite.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Wrote config: {}", config_path.display());
    }

    let config = AppConfig::load_from(&config_path)?;
    let workspace = config.workspace_root();
    if !workspace.exists() {
        std::fs::create_dir_all(&workspace)?;
        println!("  Created workspace: {}", workspace.display());
    }

    println!("\nNext steps:");
    println!("  1. Set DESKHAND_API_KEY or add api_key to {}", config_path.display());
    println!("  2. Run: deskhand run -m \"hello\"");
    println!("  3. Or serve the API: deskhand serve\n");

    Ok(())
}
