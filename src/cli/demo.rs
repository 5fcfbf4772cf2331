//! Demo catalog: schema changes, history engine and three data steps.

use app_migrations::prelude::*;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{Level, event};

pub const PRODUCT_COUNT_KEY: &str = "ProductCountBeforeMigration";

pub fn schema(config: &MigrationConfig) -> Result<MemorySchemaMigrator> {
    MemorySchemaMigrator::new()
        .with(
            "001_migration_history",
            SchemaChange::create_table(&config.history_table, HistoryRecord::columns()),
        )?
        .with(
            "002_categories",
            SchemaChange::create_table("categories", ["name"]),
        )?
        .with(
            "003_products",
            SchemaChange::create_table("products", ["name", "price", "category_id"]),
        )?
        .with(
            "004_products_price_cents",
            SchemaChange::add_column("products", "price_cents", Value::Null),
        )?
        .with(
            "005_product_metrics",
            SchemaChange::create_table("product_metrics", ["metric", "value"]),
        )
}

pub fn engine(store: &MemoryStore, config: &MigrationConfig) -> StoreHistoryEngine {
    StoreHistoryEngine::from_config(store.clone(), config)
        .capture_row_count(PRODUCT_COUNT_KEY, "products")
}

pub fn registry() -> Result<MigrationRegistry<MemoryStore>> {
    let mut registry = MigrationRegistry::new();
    registry.register_default::<SeedCatalog>(SeedCatalog::VERSION)?;
    registry.register_default::<NormalizePrices>(NormalizePrices::VERSION)?;
    registry.register_default::<ProductMetrics>(ProductMetrics::VERSION)?;
    Ok(registry)
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

/// 1.0.0: initial categories and products.
#[derive(Default)]
pub struct SeedCatalog;

impl SeedCatalog {
    pub const VERSION: SemanticVersion = SemanticVersion::new(1, 0, 0);
}

#[async_trait]
impl MigrationStep<MemoryStore> for SeedCatalog {
    fn version(&self) -> SemanticVersion {
        Self::VERSION
    }

    fn name(&self) -> &str {
        "seed catalog"
    }

    async fn up(&self, ctx: &mut StepContext<'_, MemoryStore>) -> anyhow::Result<()> {
        let txn = ctx.transaction();
        if txn.count("categories")? > 0 {
            return Ok(());
        }

        let lighting = txn.insert("categories", row(json!({"name": "Lighting"})))?;
        let furniture = txn.insert("categories", row(json!({"name": "Furniture"})))?;

        for (name, price, category) in [
            ("Desk lamp", 19.99, lighting),
            ("Floor lamp", 54.5, lighting),
            ("Oak desk", 249.0, furniture),
        ] {
            txn.insert(
                "products",
                row(json!({"name": name, "price": price, "category_id": category})),
            )?;
        }
        Ok(())
    }
}

/// 1.1.0: fill `price_cents` from the decimal `price`.
#[derive(Default)]
pub struct NormalizePrices;

impl NormalizePrices {
    pub const VERSION: SemanticVersion = SemanticVersion::new(1, 1, 0);
}

#[async_trait]
impl MigrationStep<MemoryStore> for NormalizePrices {
    fn version(&self) -> SemanticVersion {
        Self::VERSION
    }

    fn name(&self) -> &str {
        "normalize prices"
    }

    async fn up(&self, ctx: &mut StepContext<'_, MemoryStore>) -> anyhow::Result<()> {
        let updated = ctx.transaction().update_rows("products", |product| {
            if product.get("price_cents").is_some_and(|cents| !cents.is_null()) {
                return false;
            }
            let Some(price) = product.get("price").and_then(Value::as_f64) else {
                return false;
            };
            product.insert("price_cents".to_string(), json!((price * 100.0).round() as i64));
            true
        })?;

        event!(Level::INFO, updated, "product prices normalized");
        Ok(())
    }
}

/// 1.2.0: product metrics, including the count captured before the schema migration.
#[derive(Default)]
pub struct ProductMetrics;

impl ProductMetrics {
    pub const VERSION: SemanticVersion = SemanticVersion::new(1, 2, 0);
}

#[async_trait]
impl MigrationStep<MemoryStore> for ProductMetrics {
    fn version(&self) -> SemanticVersion {
        Self::VERSION
    }

    fn name(&self) -> &str {
        "product metrics"
    }

    async fn up(&self, ctx: &mut StepContext<'_, MemoryStore>) -> anyhow::Result<()> {
        let before = ctx.cache().try_get::<usize>(PRODUCT_COUNT_KEY)?;
        let first_time = ctx.first_time();
        event!(Level::INFO, first_time, products_before = ?before, "computing product metrics");

        let txn = ctx.transaction();
        let products = txn.count("products")?;
        let categories = txn.count("categories")?;

        txn.delete_rows("product_metrics", |_| true)?;
        let mut metrics = vec![("product_count", products), ("category_count", categories)];
        if let Some(before) = before {
            metrics.push(("products_before_migration", before));
        }
        for (metric, value) in metrics {
            txn.insert("product_metrics", row(json!({"metric": metric, "value": value})))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run_demo(store: &MemoryStore) -> RunReport {
        let config = MigrationConfig::default();
        let mut orchestrator = MigrationOrchestrator::builder(store.clone())
            .engine(engine(store, &config))
            .registry(registry().unwrap())
            .schema_migrator(schema(&config).unwrap())
            .config(config)
            .build()
            .unwrap();
        orchestrator.run().await.unwrap()
    }

    fn metric(rows: &[Row], name: &str) -> Option<u64> {
        rows.iter()
            .find(|row| row.get("metric") == Some(&json!(name)))
            .and_then(|row| row.get("value"))
            .and_then(Value::as_u64)
    }

    #[tokio::test]
    async fn test_demo_first_run() {
        let store = MemoryStore::new();
        let report = run_demo(&store).await;

        assert!(report.schema_migrated);
        assert_eq!(report.target, ProductMetrics::VERSION);
        assert_eq!(report.steps.len(), 3);
        assert_eq!(store.count("products").await.unwrap(), 3);

        let products = store.rows("products").await.unwrap();
        assert_eq!(products[0].get("price_cents"), Some(&json!(1999)));

        let metrics = store.rows("product_metrics").await.unwrap();
        assert_eq!(metric(&metrics, "product_count"), Some(3));
        assert_eq!(metric(&metrics, "category_count"), Some(2));
        assert_eq!(metric(&metrics, "products_before_migration"), Some(0));
    }

    #[tokio::test]
    async fn test_demo_rerun_is_idempotent() {
        let store = MemoryStore::new();
        run_demo(&store).await;
        let report = run_demo(&store).await;

        assert!(!report.schema_migrated);
        assert_eq!(report.applied_versions(), vec![ProductMetrics::VERSION]);
        assert_eq!(store.count("products").await.unwrap(), 3);
        assert_eq!(store.count("migration_history").await.unwrap(), 3);

        let metrics = store.rows("product_metrics").await.unwrap();
        assert_eq!(metrics.len(), 3);
        assert_eq!(metric(&metrics, "products_before_migration"), Some(3));
    }
}
