//! Maintenance command handlers. These run outside the orchestrator and keep
//! to plain stdout, since the operator invoked them directly.

use chrono::{Local, TimeZone};
use std::io::Write;
use std::path::Path;

use crate::config::{Config, FilesConfig};
use crate::state::StateStore;

pub fn handle_clear_log(files: &FilesConfig) {
    let path = Path::new(&files.log);
    if path.exists() {
        match std::fs::write(path, "") {
            Ok(()) => println!("Log file cleared."),
            Err(e) => eprintln!("Could not clear log file: {}", e),
        }
    } else {
        println!("Log file does not exist.");
    }
}

/// Rewrites the state file to `{}`. Deliberately does not take the state
/// lock: this is an operator override.
pub fn handle_reset_data(files: &FilesConfig) {
    let path = Path::new(&files.state);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(path, "{}") {
        Ok(()) => println!("State file reset to {{}}."),
        Err(e) => eprintln!("Could not reset state file: {}", e),
    }
}

/// Simple follow loop over the log file.
pub async fn handle_watch_log(files: &FilesConfig) {
    use std::io::{Read, Seek, SeekFrom};

    let path = Path::new(&files.log);
    if !path.exists() {
        println!("No log file found to watch.");
        return;
    }
    println!("Watching {}... (Press Ctrl+C to stop)", files.log);

    let mut pos = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    loop {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        let len = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => continue,
        };
        if len < pos {
            // truncated or rotated, start over
            pos = 0;
        }
        if len > pos {
            if let Ok(mut file) = std::fs::File::open(path) {
                if file.seek(SeekFrom::Start(pos)).is_ok() {
                    let mut chunk = String::new();
                    if file.read_to_string(&mut chunk).is_ok() {
                        print!("{}", chunk);
                        let _ = std::io::stdout().flush();
                        pos = len;
                    }
                }
            }
        }
    }
}

/// Scaffolds everything a first run needs and reports each check.
pub fn handle_check_config(config_path: &str) {
    println!("--- Configuration Check ---");

    if !Path::new(config_path).exists() {
        match toml::to_string_pretty(&Config::default()) {
            Ok(text) => match std::fs::write(config_path, text) {
                Ok(()) => println!("[OK] Created {} with defaults", config_path),
                Err(e) => println!("[FAIL] Could not create {}: {}", config_path, e),
            },
            Err(e) => println!("[FAIL] Could not render default config: {}", e),
        }
    } else {
        match Config::load(config_path) {
            Ok(_) => println!("[OK] {} exists and is valid", config_path),
            Err(e) => println!("[FAIL] {}", e),
        }
    }

    let files = Config::load_or_default(config_path).files;

    if !Path::new(&files.credentials).exists() {
        let template = "# Add your signing secrets here (one per line)\n# Example: 0x1234...  (64 hex chars, 0x prefix optional)\n";
        match std::fs::write(&files.credentials, template) {
            Ok(()) => println!("[OK] Created {} template", files.credentials),
            Err(e) => println!("[FAIL] Could not create {}: {}", files.credentials, e),
        }
    } else {
        println!("[OK] {} exists", files.credentials);
    }

    if !Path::new(&files.proxies).exists() {
        match std::fs::write(&files.proxies, "") {
            Ok(()) => println!("[OK] Created empty {}", files.proxies),
            Err(e) => println!("[FAIL] Could not create {}: {}", files.proxies, e),
        }
    } else {
        println!("[OK] {} exists", files.proxies);
    }

    let state_path = Path::new(&files.state);
    if let Some(parent) = state_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if !state_path.exists() {
        match std::fs::write(state_path, "{}") {
            Ok(()) => println!("[OK] Created empty {}", files.state),
            Err(e) => println!("[FAIL] Could not create {}: {}", files.state, e),
        }
    } else {
        println!("[OK] {} exists", files.state);
    }

    if let Some(parent) = Path::new(&files.log).parent() {
        match std::fs::create_dir_all(parent) {
            Ok(()) => println!("[OK] Log directory ready"),
            Err(e) => println!("[FAIL] Could not create log directory: {}", e),
        }
    }
}

pub fn handle_accounts(files: &FilesConfig) {
    let snapshot = match StateStore::read_snapshot(Path::new(&files.state)) {
        Ok(map) => map,
        Err(e) => {
            eprintln!("Error reading state file: {}", e);
            return;
        }
    };
    if snapshot.is_empty() {
        println!("No accounts found in {}", files.state);
        return;
    }

    let mut entries: Vec<_> = snapshot.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    println!(
        "{:<16} {:>12} {:>8} {:>6}  {}",
        "Address", "Balance", "Points", "Rank", "Last Run"
    );
    for (address, state) in entries {
        let rank = if state.rank == 0 {
            "N/A".to_string()
        } else {
            state.rank.to_string()
        };
        let last_run = state
            .last_run
            .and_then(|ms| Local.timestamp_millis_opt(ms).single())
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Never".to_string());
        println!(
            "{:<16} {:>12.4} {:>8} {:>6}  {}",
            crate::credentials::short_address(&address),
            state.balance,
            state.points,
            rank,
            last_run
        );
    }
}
