use anyhow::{Context, Result};
use objstore::{
    ObjectStore, Properties,
    config::{Command, StoreConfig},
    db,
};
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = StoreConfig::from_env_and_args()?;
    tracing::info!("Starting objstore with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let pool = db::connect(&cfg)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))?;

    // --- Schema is always brought up to date first ---
    db::run_migrations(&pool).await?;
    if command == Command::Migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    let store = ObjectStore::new(Arc::new(pool));
    match command {
        Command::Migrate => {}
        Command::Count {
            collection,
            properties,
        } => {
            let count = if properties.is_empty() {
                store.count_by_collection(&collection).await?
            } else {
                let filter = parse_properties(&properties)?;
                store.count_by_properties(&collection, &filter).await?
            };
            println!("{}", count);
        }
        Command::PurgeExpired { collection } => {
            let removed = store.delete_expired(&collection).await?;
            tracing::info!("Removed {} expired objects from `{}`", removed, collection);
            println!("{}", removed);
        }
        Command::DeleteCollection { collection } => {
            let removed = store.delete_by_collection(&collection).await?;
            tracing::info!("Removed {} objects from `{}`", removed, collection);
            println!("{}", removed);
        }
    }

    store.db.close().await;
    Ok(())
}

/// Turn `key=value` pairs into a property filter. Values that parse as JSON
/// keep their type (`tier=2`, `vip=true`), anything else is a string.
fn parse_properties(pairs: &[String]) -> Result<Properties> {
    pairs
        .iter()
        .map(|pair| -> Result<(String, Value)> {
            let (key, raw) = pair
                .split_once('=')
                .with_context(|| format!("property `{}` is not in key=value form", pair))?;
            let value = serde_json::from_str::<Value>(raw)
                .unwrap_or_else(|_| Value::String(raw.to_string()));
            Ok((key.trim().to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn property_values_keep_json_types() {
        let props = parse_properties(&[
            "tier=2".to_string(),
            "vip=true".to_string(),
            "status=paid".to_string(),
        ])
        .unwrap();
        assert_eq!(props.get("tier"), Some(&json!(2)));
        assert_eq!(props.get("vip"), Some(&json!(true)));
        assert_eq!(props.get("status"), Some(&json!("paid")));
    }

    #[test]
    fn rejects_pairs_without_separator() {
        assert!(parse_properties(&["status".to_string()]).is_err());
    }
}
