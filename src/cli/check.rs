//! `parley check`: configuration and store diagnostics

use crate::server::{AppConfig, StoreBackend};
use parley_core::SqliteRecordStore;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Parley configuration check\n");

    println!("{}", config.to_redacted_toml()?);

    let mut all_ok = true;
    all_ok &= check_telegram(config);
    all_ok &= check_store(config).await;

    println!();
    if !all_ok {
        anyhow::bail!("some checks failed, see above");
    }
    println!("✅ All checks passed! Ready to run `parley serve`.");
    Ok(())
}

fn check_telegram(config: &AppConfig) -> bool {
    print!("Checking Telegram bot token... ");
    match config.telegram_config() {
        Ok(telegram) => {
            if telegram.allowed_users.is_empty() {
                println!("✅ (all users allowed)");
            } else {
                println!("✅ ({} allowed users)", telegram.allowed_users.len());
            }
            true
        }
        Err(e) => {
            println!("❌ {e:#}");
            false
        }
    }
}

async fn check_store(config: &AppConfig) -> bool {
    print!("Checking record store... ");
    if config.store.backend == StoreBackend::Memory {
        println!("⚠️  in-memory (records are lost on exit)");
        return true;
    }

    let path = match config.store.sqlite_path() {
        Some(path) => path,
        None => match SqliteRecordStore::default_path() {
            Ok(path) => path,
            Err(e) => {
                println!("❌ {e}");
                return false;
            }
        },
    };
    let store = match SqliteRecordStore::new(&path).await {
        Ok(store) => store,
        Err(e) => {
            println!("❌ {} ({e})", path.display());
            return false;
        }
    };
    match (store.health_check().await, store.count().await) {
        (Ok(true), Ok(count)) => {
            println!("✅ {} ({count} records)", path.display());
            true
        }
        (Ok(false), _) => {
            println!("❌ {} (health check failed)", path.display());
            false
        }
        (Err(e), _) | (_, Err(e)) => {
            println!("❌ {} ({e})", path.display());
            false
        }
    }
}
