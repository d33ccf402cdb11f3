//! End-to-end runs of the sync engine against the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use mapsync::core::value::row;
use mapsync::{
    AuditEvent, Column, DiagnosticKind, MappingSpec, MediaIngest, MediaRequest, MediaSummary,
    MemoryAuditSink, MemoryStore, Resolver, RunContext, SqlValue, SyncConfig, SyncEngine,
    SyncError, TableSchema, VariantStage,
};

// =============================================================================
// Fixtures
// =============================================================================

fn int(name: &str) -> Column {
    Column::new(name, "int")
}

fn text(name: &str, len: u32) -> Column {
    Column::new(name, "varchar").with_max_length(len)
}

fn price() -> Column {
    Column::new("price", "decimal(20,6)")
}

/// A small PrestaShop-like schema with two active languages.
fn shop_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new()
        .with_table(
            TableSchema::new("ps_product")
                .column(int("id_product").auto_increment())
                .column(text("reference", 64))
                .column(price())
                .column(int("cache_default_attribute"))
                .primary_key(["id_product"]),
        )
        .with_table(
            TableSchema::new("ps_product_shop")
                .column(int("id_product"))
                .column(int("id_shop"))
                .column(price())
                .column(int("cache_default_attribute"))
                .primary_key(["id_product", "id_shop"]),
        )
        .with_table(
            TableSchema::new("ps_product_lang")
                .column(int("id_product"))
                .column(int("id_shop"))
                .column(int("id_lang"))
                .column(text("name", 16))
                .primary_key(["id_product", "id_shop", "id_lang"]),
        )
        .with_table(
            TableSchema::new("ps_lang")
                .column(int("id_lang").auto_increment())
                .column(Column::new("active", "tinyint"))
                .primary_key(["id_lang"]),
        )
        .with_table(
            TableSchema::new("ps_category_group")
                .column(int("id_category"))
                .column(int("id_group"))
                .primary_key(["id_category", "id_group"]),
        )
        .with_table(
            TableSchema::new("ps_attribute_group")
                .column(int("id_attribute_group").auto_increment())
                .column(Column::new("is_color_group", "tinyint"))
                .column(text("group_type", 16))
                .column(int("position"))
                .primary_key(["id_attribute_group"]),
        )
        .with_table(
            TableSchema::new("ps_attribute_group_lang")
                .column(int("id_attribute_group"))
                .column(int("id_lang"))
                .column(text("name", 128))
                .column(text("public_name", 64))
                .primary_key(["id_attribute_group", "id_lang"]),
        )
        .with_table(
            TableSchema::new("ps_attribute_group_shop")
                .column(int("id_attribute_group"))
                .column(int("id_shop"))
                .primary_key(["id_attribute_group", "id_shop"]),
        )
        .with_table(
            TableSchema::new("ps_attribute")
                .column(int("id_attribute").auto_increment())
                .column(int("id_attribute_group"))
                .column(text("color", 32))
                .column(int("position"))
                .primary_key(["id_attribute"]),
        )
        .with_table(
            TableSchema::new("ps_attribute_lang")
                .column(int("id_attribute"))
                .column(int("id_lang"))
                .column(text("name", 128))
                .primary_key(["id_attribute", "id_lang"]),
        )
        .with_table(
            TableSchema::new("ps_attribute_shop")
                .column(int("id_attribute"))
                .column(int("id_shop"))
                .primary_key(["id_attribute", "id_shop"]),
        )
        .with_table(
            TableSchema::new("ps_product_attribute")
                .column(int("id_product_attribute").auto_increment())
                .column(int("id_product"))
                .column(text("reference", 64))
                .column(price())
                .column(Column::new("default_on", "tinyint"))
                .primary_key(["id_product_attribute"]),
        )
        .with_table(
            TableSchema::new("ps_product_attribute_shop")
                .column(int("id_product_attribute"))
                .column(int("id_product"))
                .column(int("id_shop"))
                .column(price())
                .column(Column::new("default_on", "tinyint"))
                .primary_key(["id_product_attribute", "id_shop"]),
        )
        .with_table(
            TableSchema::new("ps_product_attribute_combination")
                .column(int("id_attribute"))
                .column(int("id_product_attribute"))
                .primary_key(["id_attribute", "id_product_attribute"]),
        );

    for active in [1, 1, 0] {
        store.seed("ps_lang", row([("active", active)])).unwrap();
    }
    Arc::new(store)
}

fn engine(store: &Arc<MemoryStore>) -> (SyncEngine, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = SyncEngine::new(store.clone(), SyncConfig::default()).with_audit(audit.clone());
    (engine, audit)
}

fn ctx() -> RunContext {
    RunContext::new("rec-1").with_store_ids(vec![1])
}

fn mapping(yaml: &str) -> MappingSpec {
    MappingSpec::from_yaml(yaml).unwrap()
}

fn written_columns(audit: &MemoryAuditSink, table: &str) -> Vec<String> {
    audit
        .events()
        .into_iter()
        .filter_map(|e| match e {
            AuditEvent::FieldWritten {
                table: t, column, ..
            } if t == table => Some(column),
            _ => None,
        })
        .collect()
}

fn decimal(value: i64, scale: u32) -> SqlValue {
    SqlValue::Decimal(Decimal::new(value, scale))
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_scenario_a_one_row_per_store() {
    let store = Arc::new(
        MemoryStore::new().with_table(
            TableSchema::new("ps_widget")
                .column(text("name", 64))
                .column(text("code", 32))
                .column(int("id_shop"))
                .primary_key(["code", "id_shop"]),
        ),
    );
    let (engine, audit) = engine(&store);
    let mapping = mapping(
        r#"
tables:
  widget:
    fields:
      name: title
      code: "=FIXED"
    settings:
      storeIds: [1, 2]
"#,
    );

    let result = engine
        .run(&mapping, &json!({"title": "Pump"}), &RunContext::new("w-1"))
        .await
        .unwrap();

    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    let rows = store.rows("ps_widget");
    assert_eq!(rows.len(), 2);
    for (row, shop) in rows.iter().zip([1, 2]) {
        assert_eq!(row["name"], SqlValue::from("Pump"));
        assert_eq!(row["code"], SqlValue::from("FIXED"));
        assert_eq!(row["id_shop"], SqlValue::Int(shop));
    }
    assert_eq!(audit.of_kind("row_written").len(), 2);
    assert_eq!(store.write_attempts("ps_widget"), 2);
}

#[tokio::test]
async fn test_auto_increment_table_inserts_per_store() {
    let store = Arc::new(
        MemoryStore::new()
            .with_table(
                TableSchema::new("ps_product")
                    .column(int("id_product").auto_increment())
                    .column(text("reference", 64))
                    .primary_key(["id_product"]),
            )
            .with_table(
                TableSchema::new("ps_specific_price")
                    .column(int("id_specific_price").auto_increment())
                    .column(int("id_product"))
                    .column(int("id_shop"))
                    .column(int("from_quantity"))
                    .primary_key(["id_specific_price"]),
            ),
    );
    let (engine, _) = engine(&store);
    let mapping = mapping(
        r#"
tables:
  product:
    fields:
      reference: sku
  specific_price:
    fields:
      from_quantity: "=3"
    settings:
      storeIds: [1, 2]
"#,
    );

    let result = engine
        .run(&mapping, &json!({"sku": "P-1"}), &ctx())
        .await
        .unwrap();

    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    let rows = store.rows("ps_specific_price");
    assert_eq!(rows.len(), 2);
    for (row, (id, shop)) in rows.iter().zip([(1, 1), (2, 2)]) {
        assert_eq!(row["id_specific_price"], SqlValue::Int(id));
        assert_eq!(row["id_shop"], SqlValue::Int(shop));
        assert_eq!(row["id_product"], SqlValue::Int(1));
        assert_eq!(row["from_quantity"], SqlValue::Int(3));
    }
    assert_eq!(store.write_attempts("ps_specific_price"), 2);
}

#[tokio::test]
async fn test_scenario_b_single_variant() {
    let store = shop_store();
    let (engine, _) = engine(&store);
    let mapping = mapping("tables:\n  product:\n    fields:\n      reference: sku\nvariants: {}\n");
    let record = json!({
        "sku": "P-1",
        "variants": [{"attributes": {"Color": "Red"}, "sku": "R1"}]
    });

    let result = engine.run(&mapping, &record, &ctx()).await.unwrap();

    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(result.generated_ids.get("product"), Some(&1));

    assert_eq!(store.rows("ps_attribute_group").len(), 1);
    let group_names = store.rows("ps_attribute_group_lang");
    assert_eq!(group_names.len(), 2);
    assert!(group_names.iter().all(|r| r["name"] == SqlValue::from("Color")));

    assert_eq!(store.rows("ps_attribute").len(), 1);
    assert_eq!(store.rows("ps_attribute_lang")[0]["name"], SqlValue::from("Red"));

    let combinations = store.rows("ps_product_attribute");
    assert_eq!(combinations.len(), 1);
    assert_eq!(combinations[0]["reference"], SqlValue::from("R1"));
    assert_eq!(combinations[0]["default_on"], SqlValue::Int(1));

    let links = store.rows("ps_product_attribute_combination");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["id_attribute"], SqlValue::Int(1));
    assert_eq!(links[0]["id_product_attribute"], SqlValue::Int(1));

    assert_eq!(result.default_combination_id, Some(1));
    assert_eq!(result.variants[0].stage, VariantStage::Defaulted);
    assert_eq!(
        store.rows("ps_product")[0]["cache_default_attribute"],
        SqlValue::Int(1)
    );
    assert_eq!(
        store.rows("ps_product_attribute_shop")[0]["default_on"],
        SqlValue::Int(1)
    );
}

#[tokio::test]
async fn test_scenario_c_strict_unresolved_path_is_omitted() {
    let store = shop_store();
    let (engine, audit) = engine(&store);
    let mapping = mapping(
        r#"
tables:
  product:
    fields:
      reference: sku
      price: item.price_impact_ht
    defaults:
      price: "=0"
"#,
    );

    let result = engine
        .run(&mapping, &json!({"sku": "P-1"}), &ctx().with_strict_mapping(true))
        .await
        .unwrap();

    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(written_columns(&audit, "ps_product"), vec!["reference"]);
    assert_eq!(store.rows("ps_product")[0]["price"], SqlValue::Null);
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_resolution_is_pure() {
    let record = json!({"product": {"name": " Pump "}, "name": "fallback"});
    let spec = mapsync::FieldSpec::parse(&json!(["missing", "name"])).unwrap();
    let resolver = Resolver::new(&record).with_primary("product");

    let first = resolver.resolve(&spec);
    let second = resolver.resolve(&spec);
    assert_eq!(first, Some(json!("Pump")));
    assert_eq!(first, second);
    assert_eq!(record["product"]["name"], json!(" Pump "));
}

#[tokio::test]
async fn test_defaults_only_fill_gaps() {
    let store = shop_store();
    store
        .seed("ps_product", row([("reference", SqlValue::from("A")), ("price", decimal(10, 0))]))
        .unwrap();
    store
        .seed("ps_product", row([("reference", SqlValue::from("B")), ("price", SqlValue::Null)]))
        .unwrap();
    let (engine, _) = engine(&store);
    let defaults = mapping(
        "tables:\n  product:\n    fields:\n      reference: sku\n    defaults:\n      price: \"=5\"\n",
    );

    engine
        .run(&defaults, &json!({"sku": "A"}), &ctx().with_target_id(Some(1)))
        .await
        .unwrap();
    engine
        .run(&defaults, &json!({"sku": "B"}), &ctx().with_target_id(Some(2)))
        .await
        .unwrap();

    let rows = store.rows("ps_product");
    assert_eq!(rows[0]["price"], decimal(10, 0));
    assert_eq!(rows[1]["price"], decimal(5, 0));

    let explicit = mapping(
        "tables:\n  product:\n    fields:\n      price: \"=7\"\n    defaults:\n      price: \"=5\"\n",
    );
    engine
        .run(&explicit, &json!({}), &ctx().with_target_id(Some(1)))
        .await
        .unwrap();
    assert_eq!(store.rows("ps_product")[0]["price"], decimal(7, 0));
}

#[tokio::test]
async fn test_truncation_is_idempotent() {
    let store = shop_store();
    let (engine, _) = engine(&store);
    let mapping = mapping(
        r#"
tables:
  product:
    fields:
      reference: sku
  product_lang:
    fields:
      name: title
    settings:
      languageIds: [1]
"#,
    );
    let record = json!({"sku": "P-1", "title": "An extremely long product title"});

    let first = engine.run(&mapping, &record, &ctx()).await.unwrap();
    let second = engine
        .run(&mapping, &record, &ctx().with_target_id(Some(1)))
        .await
        .unwrap();

    let rows = store.rows("ps_product_lang");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], SqlValue::from("An extremely lon"));

    let details = |result: &mapsync::SyncResult| -> Vec<String> {
        result
            .of_kind(DiagnosticKind::Truncated)
            .iter()
            .map(|d| d.detail.clone())
            .collect()
    };
    assert_eq!(details(&first).len(), 1);
    assert_eq!(details(&first), details(&second));
    assert!(details(&first)[0].contains("31 -> 16"));
}

#[tokio::test]
async fn test_same_normalized_value_creates_one_attribute() {
    let store = shop_store();
    let (engine, _) = engine(&store);
    let mapping = mapping("tables:\n  product:\n    fields:\n      reference: sku\nvariants: {}\n");
    let record = json!({
        "sku": "P-1",
        "variants": [
            {"attributes": {"Color": "Red"}, "sku": "R1"},
            {"attributes": {"Color": "red "}, "sku": "R2"}
        ]
    });

    let result = engine.run(&mapping, &record, &ctx()).await.unwrap();

    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(store.rows("ps_attribute").len(), 1);
    assert_eq!(store.rows("ps_product_attribute").len(), 2);
    let links = store.rows("ps_product_attribute_combination");
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|l| l["id_attribute"] == SqlValue::Int(1)));
}

#[tokio::test]
async fn test_relink_keeps_one_value_per_group() {
    let store = shop_store();
    let (engine, _) = engine(&store);
    let mapping = mapping("tables:\n  product:\n    fields:\n      reference: sku\nvariants: {}\n");
    let red = json!({"sku": "P-1", "variants": [{"attributes": {"Color": "Red"}, "sku": "R1"}]});
    let blue = json!({"sku": "P-1", "variants": [{"attributes": {"Color": "Blue"}, "sku": "R1"}]});

    engine.run(&mapping, &red, &ctx()).await.unwrap();
    let result = engine
        .run(&mapping, &blue, &ctx().with_target_id(Some(1)))
        .await
        .unwrap();

    assert_eq!(result.variants[0].combination_id, Some(1));
    assert_eq!(store.rows("ps_product_attribute").len(), 1);
    assert_eq!(store.rows("ps_attribute").len(), 2);
    let links = store.rows("ps_product_attribute_combination");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["id_attribute"], SqlValue::Int(2));
}

#[tokio::test]
async fn test_unsatisfiable_group_axis_skips_table() {
    let store = shop_store();
    let (engine, _) = engine(&store);
    let mapping = mapping("tables:\n  category_group:\n    fields:\n      id_category: \"=3\"\n");

    let result = engine.run(&mapping, &json!({}), &ctx()).await.unwrap();

    let missing = result.of_kind(DiagnosticKind::MappingMissingAxis);
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].table, "ps_category_group");
    assert_eq!(store.write_attempts("ps_category_group"), 0);
    assert!(store.rows("ps_category_group").is_empty());
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_write_failure_does_not_stop_the_run() {
    let store = shop_store();
    store.fail_writes_to("ps_product_lang");
    let (engine, audit) = engine(&store);
    let mapping = mapping(
        r#"
tables:
  product:
    fields:
      reference: sku
  product_lang:
    fields:
      name: title
  product_shop:
    fields:
      price: "=12.5"
"#,
    );

    let result = engine
        .run(&mapping, &json!({"sku": "P-1", "title": "Pump"}), &ctx())
        .await
        .unwrap();

    let failed = result.of_kind(DiagnosticKind::WriteFailed);
    assert_eq!(failed.len(), 2, "one per active language");
    assert!(failed[0].detail.starts_with("write:"));
    assert_eq!(failed[0].scope, "shop=1 lang=1 group=-");
    assert_eq!(audit.of_kind("row_failed").len(), 2);

    let shop_rows = store.rows("ps_product_shop");
    assert_eq!(shop_rows.len(), 1);
    assert_eq!(shop_rows[0]["price"], decimal(125, 1));
    assert_eq!(shop_rows[0]["id_product"], SqlValue::Int(1));
}

#[tokio::test]
async fn test_missing_table_and_key_are_diagnostics() {
    let store = shop_store();
    let (engine, _) = engine(&store);
    let mapping = mapping(
        r#"
tables:
  feature_product:
    fields:
      id_feature: "=1"
  product_shop:
    fields:
      price: "=1"
"#,
    );

    let result = engine.run(&mapping, &json!({}), &ctx()).await.unwrap();

    assert_eq!(result.of_kind(DiagnosticKind::MissingTable).len(), 1);
    let missing_key = result.of_kind(DiagnosticKind::MissingPrimaryKey);
    assert_eq!(missing_key.len(), 1);
    assert!(missing_key[0].detail.contains("id_product"));
    assert_eq!(store.write_attempts("ps_product_shop"), 0);
}

#[tokio::test]
async fn test_fatal_errors_write_nothing() {
    let store = shop_store();
    let (engine, audit) = engine(&store);
    let mapping = mapping("tables:\n  product:\n    fields:\n      reference: sku\n");

    let err = engine
        .run(&mapping, &json!({"sku": "A"}), &RunContext::new(""))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::MissingRecordId));

    store.set_unreachable(true);
    let err = engine.run(&mapping, &json!({"sku": "A"}), &ctx()).await.unwrap_err();
    assert!(matches!(err, SyncError::SchemaUnavailable(_)));

    store.set_unreachable(false);
    assert!(store.rows("ps_product").is_empty());
    assert!(audit.events().is_empty());
}

// =============================================================================
// Variants
// =============================================================================

#[tokio::test]
async fn test_numeric_coercion_differs_by_table() {
    let store = shop_store();
    let (engine, _) = engine(&store);
    let mapping = mapping(
        r#"
tables:
  product:
    fields:
      reference: sku
variants:
  combination:
    fields:
      price: "@.price_impact"
  combination_shop:
    fields:
      price: "@.price_impact"
"#,
    );
    let record = json!({
        "sku": "P-1",
        "variants": [
            {"attributes": {"Size": "M"}, "sku": "M1", "price_impact": "2,50 €"},
            {"attributes": {"Size": "L"}, "sku": "L1", "price_impact": "n/a"}
        ]
    });

    let result = engine.run(&mapping, &record, &ctx()).await.unwrap();

    let combinations = store.rows("ps_product_attribute");
    assert_eq!(combinations[0]["price"], decimal(25, 1));
    assert_eq!(combinations[1]["price"], SqlValue::Null);

    let shop_rows = store.rows("ps_product_attribute_shop");
    assert_eq!(shop_rows[0]["price"], decimal(25, 1));
    assert_eq!(shop_rows[1]["price"], SqlValue::Int(0));

    assert_eq!(result.of_kind(DiagnosticKind::Coerced).len(), 2);
    assert!(result.variants.iter().all(|v| v.failed.is_none()));
}

#[tokio::test]
async fn test_map_all_reaches_existing_combinations() {
    let store = shop_store();
    store
        .seed("ps_product", row([("reference", "P-1")]))
        .unwrap();
    store
        .seed(
            "ps_product_attribute",
            row([
                ("id_product", SqlValue::Int(1)),
                ("reference", SqlValue::from("OLD")),
                ("default_on", SqlValue::Int(1)),
            ]),
        )
        .unwrap();
    let (engine, _) = engine(&store);
    let mapping = mapping(
        r#"
tables:
  product:
    fields:
      reference: sku
variants:
  combination_shop:
    fields:
      price: "=2.5"
  map_all: true
"#,
    );
    let record = json!({"sku": "P-1", "variants": [{"attributes": {"Color": "Red"}, "sku": "R1"}]});

    let result = engine
        .run(&mapping, &record, &ctx().with_target_id(Some(1)))
        .await
        .unwrap();

    assert_eq!(result.default_combination_id, Some(2));
    let shop_rows = store.rows("ps_product_attribute_shop");
    assert_eq!(shop_rows.len(), 2);
    assert!(shop_rows.iter().all(|r| r["price"] == decimal(25, 1)));

    let combinations = store.rows("ps_product_attribute");
    assert_eq!(combinations[0]["default_on"], SqlValue::Null);
    assert_eq!(combinations[1]["default_on"], SqlValue::Int(1));
}

#[tokio::test]
async fn test_rerun_moves_default_to_new_combination() {
    let store = shop_store();
    let (engine, _) = engine(&store);
    let mapping = mapping("tables:\n  product:\n    fields:\n      reference: sku\nvariants: {}\n");
    let first = json!({"sku": "P-1", "variants": [{"attributes": {"Color": "Red"}, "sku": "R1"}]});
    let second = json!({"sku": "P-1", "variants": [
        {"attributes": {"Color": "Red"}, "sku": "R1"},
        {"attributes": {"Color": "Blue"}, "sku": "B1"}
    ]});

    let result = engine.run(&mapping, &first, &ctx()).await.unwrap();
    assert_eq!(result.default_combination_id, Some(1));

    let result = engine
        .run(&mapping, &second, &ctx().with_target_id(Some(1)))
        .await
        .unwrap();

    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(result.default_combination_id, Some(2));
    assert!(!result.variants[0].created);
    assert!(result.variants[1].created);

    let combinations = store.rows("ps_product_attribute");
    assert_eq!(combinations.len(), 2);
    assert_eq!(combinations[0]["default_on"], SqlValue::Null);
    assert_eq!(combinations[1]["default_on"], SqlValue::Int(1));

    let shop_rows = store.rows("ps_product_attribute_shop");
    let flags: Vec<(SqlValue, SqlValue)> = shop_rows
        .iter()
        .map(|r| (r["id_product_attribute"].clone(), r["default_on"].clone()))
        .collect();
    assert_eq!(
        flags,
        vec![
            (SqlValue::Int(1), SqlValue::Null),
            (SqlValue::Int(2), SqlValue::Int(1)),
        ]
    );
    assert_eq!(
        store.rows("ps_product")[0]["cache_default_attribute"],
        SqlValue::Int(2)
    );
}

#[tokio::test]
async fn test_variants_without_product_id() {
    let store = shop_store();
    store.fail_writes_to("ps_product");
    let (engine, _) = engine(&store);
    let mapping = mapping("tables:\n  product:\n    fields:\n      reference: sku\nvariants: {}\n");
    let record = json!({"sku": "P-1", "variants": [{"attributes": {"Color": "Red"}}]});

    let result = engine.run(&mapping, &record, &ctx()).await.unwrap();

    assert_eq!(result.of_kind(DiagnosticKind::VariantFailed).len(), 1);
    assert!(store.rows("ps_product_attribute").is_empty());
}

// =============================================================================
// Run metadata, media and results
// =============================================================================

struct CountingMedia;

#[async_trait]
impl MediaIngest for CountingMedia {
    async fn ingest(&self, request: MediaRequest<'_>) -> mapsync::Result<MediaSummary> {
        let images = request.record["images"].as_array().map_or(0, Vec::len);
        Ok(MediaSummary {
            processed: images,
            messages: vec![format!("product {:?}", request.target_id)],
            ..MediaSummary::default()
        })
    }
}

struct BrokenMedia;

#[async_trait]
impl MediaIngest for BrokenMedia {
    async fn ingest(&self, _request: MediaRequest<'_>) -> mapsync::Result<MediaSummary> {
        Err(SyncError::Config("image host unreachable".into()))
    }
}

#[tokio::test]
async fn test_media_summary_is_attached() {
    let store = shop_store();
    let (engine, _) = engine(&store);
    let engine = engine.with_media(Arc::new(CountingMedia));
    let mapping = mapping("tables:\n  product:\n    fields:\n      reference: sku\n");

    let result = engine
        .run(&mapping, &json!({"sku": "A", "images": ["a.jpg", "b.jpg"]}), &ctx())
        .await
        .unwrap();

    let media = result.media.unwrap();
    assert_eq!(media.processed, 2);
    assert_eq!(media.messages, vec!["product Some(1)"]);
}

#[tokio::test]
async fn test_media_failure_is_a_diagnostic() {
    let store = shop_store();
    let (engine, _) = engine(&store);
    let engine = engine.with_media(Arc::new(BrokenMedia));
    let mapping = mapping("tables:\n  product:\n    fields:\n      reference: sku\n");

    let result = engine.run(&mapping, &json!({"sku": "A"}), &ctx()).await.unwrap();

    assert!(result.media.is_none());
    let failed = result.of_kind(DiagnosticKind::MediaFailed);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].detail.contains("image host unreachable"));
    assert_eq!(store.rows("ps_product").len(), 1);
}

#[tokio::test]
async fn test_meta_namespace_and_result_json() {
    let store = shop_store();
    let (engine, audit) = engine(&store);
    let mapping = mapping("tables:\n  product:\n    fields:\n      reference: \"#.record_id\"\n");

    let result = engine.run(&mapping, &json!({}), &ctx()).await.unwrap();

    assert_eq!(store.rows("ps_product")[0]["reference"], SqlValue::from("rec-1"));
    let json: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["record_id"], "rec-1");
    assert_eq!(json["generated_ids"]["product"], 1);
    assert!(json.get("media").is_none());

    let finished = audit.of_kind("run_finished");
    assert_eq!(finished.len(), 1);
    assert!(matches!(
        &finished[0],
        AuditEvent::RunFinished { record_id, diagnostics: 0, .. } if record_id == "rec-1"
    ));
}

#[tokio::test]
async fn test_concurrent_runs_share_one_engine() {
    let store = shop_store();
    let (engine, _) = engine(&store);
    let mapping = mapping("tables:\n  product:\n    fields:\n      reference: sku\n");
    let first_record = json!({"sku": "A"});
    let second_record = json!({"sku": "B"});
    let first_ctx = RunContext::new("a").with_store_ids(vec![1]);
    let second_ctx = RunContext::new("b").with_store_ids(vec![1]);

    let (first, second) = tokio::join!(
        engine.run(&mapping, &first_record, &first_ctx),
        engine.run(&mapping, &second_record, &second_ctx),
    );

    let (first, second) = (first.unwrap(), second.unwrap());
    assert_ne!(first.run_id, second.run_id);
    assert_ne!(
        first.generated_ids.get("product"),
        second.generated_ids.get("product")
    );
    assert_eq!(store.rows("ps_product").len(), 2);
}
