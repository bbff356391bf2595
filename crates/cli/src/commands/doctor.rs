//! `deskhand doctor` - diagnose configuration problems.

use std::path::Path;

use crate::runtime::{config_file, load_config};

pub fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("deskhand doctor");
    println!("===============\n");

    let mut issues = 0;
    let path = config_file(config_path);

    if !path.exists() {
        println!("  [warn] No config file at {}, defaults apply. Run `deskhand init`", path.display());
        issues += 1;
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("  [ok]   Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            println!("\n  1 blocking issue found.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  [ok]   API key configured");
    } else {
        println!("  [fail] No API key. Set DESKHAND_API_KEY or add api_key to the config");
        issues += 1;
    }

    let workspace = config.workspace_root();
    if workspace.is_dir() {
        println!("  [ok]   Workspace {}", workspace.display());
    } else {
        println!("  [warn] Workspace {} does not exist yet", workspace.display());
        issues += 1;
    }

    if config.scheduler.enabled {
        match &config.scheduler.jobs_path {
            Some(jobs) => println!("  [ok]   Scheduler persists jobs to {}", jobs.display()),
            None => println!("  [warn] Scheduler jobs are in-memory only (set scheduler.jobs_path)"),
        }
        println!("  [ok]   {} config schedule(s)", config.schedules.len());
    } else {
        println!("  [info] Scheduler disabled");
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
