//! Combination builder: turns a record's variants into attribute groups,
//! attribute values, combinations and their links.
//!
//! Each variant moves through [`VariantStage`]s:
//! `Pending -> Located | Created -> Linked -> FieldsApplied -> Defaulted`.
//! A failing step abandons that variant only; links already made stay, since
//! linking is idempotent. After all variants, the first combination processed
//! becomes the product's default. With `map_all`, per-store combination
//! fields are also re-applied to combinations this run did not touch.

mod naming;
mod numeric;

pub use naming::{
    attribute_key_candidates, legacy_variants, lookup_attribute, normalize_group_label,
    normalize_key,
};
pub use numeric::parse_locale_decimal;

use std::slice;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::audit::WriteAction;
use crate::core::schema::TableSchema;
use crate::core::value::{row, Row, SqlValue};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::mapping::{FieldSpec, ScopeSettings, TableBinding, VariantSpec};
use crate::resolve::{sanitize, value_to_text, Resolver};
use crate::scope::ScopeTuple;
use crate::state::RunState;
use crate::writer::{
    draft_fields, finalize, Cell, Finalized, NumericPolicy, RowDraft, ValueSource, WriteEnv,
    WriteTarget,
};

/// Where a variant got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantStage {
    Pending,
    Located,
    Created,
    Linked,
    FieldsApplied,
    Defaulted,
}

/// Result for one variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantOutcome {
    pub reference: Option<String>,
    pub combination_id: Option<i64>,
    pub stage: VariantStage,
    /// The combination row was inserted by this run.
    pub created: bool,
    /// Why the variant was abandoned, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<String>,
}

/// Result of a builder run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VariantReport {
    pub default_combination_id: Option<i64>,
    pub outcomes: Vec<VariantOutcome>,
}

/// One attribute group to ensure and link.
#[derive(Debug, Clone)]
struct GroupDef<'s> {
    label: String,
    /// Key of the value in a variant's attribute map.
    key: String,
    value: Option<&'s FieldSpec>,
    public_name: Option<&'s FieldSpec>,
    group_type: String,
}

/// Schemas of the catalog tables, with their key column names.
struct Catalog {
    group: Arc<TableSchema>,
    group_lang: Arc<TableSchema>,
    group_shop: Option<Arc<TableSchema>>,
    attribute: Arc<TableSchema>,
    attribute_lang: Arc<TableSchema>,
    attribute_shop: Option<Arc<TableSchema>>,
    combination: Arc<TableSchema>,
    combination_shop: Option<Arc<TableSchema>>,
    link: Arc<TableSchema>,
    product: Option<Arc<TableSchema>>,
    product_shop: Option<Arc<TableSchema>>,
    group_id: String,
    attribute_id: String,
    combination_id: String,
    product_id: String,
}

/// Builds combinations for one product.
pub struct CombinationBuilder<'a, 'e> {
    env: &'a WriteEnv<'e>,
    spec: &'a VariantSpec,
    record: &'a Value,
    product_id: i64,
}

impl<'a, 'e> CombinationBuilder<'a, 'e> {
    pub fn new(env: &'a WriteEnv<'e>, spec: &'a VariantSpec, record: &'a Value, product_id: i64) -> Self {
        Self {
            env,
            spec,
            record,
            product_id,
        }
    }

    pub async fn build(&self, state: &mut RunState) -> VariantReport {
        let variants = self.variant_list();
        if variants.is_empty() {
            debug!("No variants at '{}'", self.spec.source);
            return VariantReport::default();
        }
        let Some(catalog) = self.load_catalog(state).await else {
            return VariantReport::default();
        };
        info!(
            "Building {} combination(s) for product {}",
            variants.len(),
            self.product_id
        );

        let groups = self.group_defs(&variants);
        let mut group_ids = Vec::with_capacity(groups.len());
        for def in &groups {
            match self.ensure_group(state, &catalog, def).await {
                Ok(id) => group_ids.push(Some(id)),
                Err(diagnostic) => {
                    state.diagnostics.push(diagnostic);
                    group_ids.push(None);
                }
            }
        }

        let mut report = VariantReport::default();
        for (index, variant) in variants.iter().enumerate() {
            let outcome = self
                .build_variant(state, &catalog, &groups, &group_ids, variant)
                .await;
            if let Some(reason) = &outcome.failed {
                state.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::VariantFailed,
                    &catalog.combination.name,
                    format!(
                        "variant #{} ({}) abandoned at {:?}: {}",
                        index,
                        outcome.reference.as_deref().unwrap_or("no reference"),
                        outcome.stage,
                        reason
                    ),
                ));
            }
            report.outcomes.push(outcome);
        }

        // First created combination, else the first one located.
        let first = report
            .outcomes
            .iter()
            .position(|o| o.created && o.combination_id.is_some())
            .or_else(|| {
                report
                    .outcomes
                    .iter()
                    .position(|o| o.combination_id.is_some())
            });
        if let Some(index) = first {
            let id = report.outcomes[index].combination_id.unwrap_or_default();
            match self.apply_default(state, &catalog, id).await {
                Ok(()) => {
                    report.outcomes[index].stage = VariantStage::Defaulted;
                    report.default_combination_id = Some(id);
                }
                Err(diagnostic) => state.diagnostics.push(diagnostic),
            }
        }

        if self.spec.map_all {
            let touched: Vec<i64> = report
                .outcomes
                .iter()
                .filter_map(|o| o.combination_id)
                .collect();
            self.map_all(state, &catalog, &touched).await;
        }

        report
    }

    // ===== Inputs =====

    fn variant_list(&self) -> Vec<Value> {
        let resolver = Resolver::new(self.record).with_primary(self.env.primary);
        match resolver.resolve(&FieldSpec::path(&self.spec.source)) {
            Some(Value::Array(items)) => items.into_iter().filter(Value::is_object).collect(),
            _ => Vec::new(),
        }
    }

    fn attributes_of(&self, variant: &Value) -> Option<Value> {
        Resolver::new(variant).resolve(&FieldSpec::path(&self.spec.attributes))
    }

    /// Explicit groups, or one group per attribute key of the first variant.
    fn group_defs(&self, variants: &[Value]) -> Vec<GroupDef<'a>> {
        if !self.spec.groups.is_empty() {
            return self
                .spec
                .groups
                .iter()
                .map(|g| GroupDef {
                    label: g.name.trim().to_string(),
                    key: g.key.clone().unwrap_or_else(|| g.name.clone()),
                    value: g.value.as_ref(),
                    public_name: g.public_name.as_ref(),
                    group_type: g.group_type.clone(),
                })
                .collect();
        }

        match variants.first().and_then(|v| self.attributes_of(v)) {
            Some(Value::Object(map)) => map
                .keys()
                .map(|key| GroupDef {
                    label: normalize_group_label(key),
                    key: key.clone(),
                    value: None,
                    public_name: None,
                    group_type: "select".to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    async fn load_catalog(&self, state: &mut RunState) -> Option<Catalog> {
        let tables = &self.env.sync.variant_tables;
        let group = self.table(state, &tables.attribute_group, true).await;
        let group_lang = self.table(state, &tables.attribute_group_lang, true).await;
        let group_shop = self.table(state, &tables.attribute_group_shop, false).await;
        let attribute = self.table(state, &tables.attribute, true).await;
        let attribute_lang = self.table(state, &tables.attribute_lang, true).await;
        let attribute_shop = self.table(state, &tables.attribute_shop, false).await;
        let combination = self.table(state, &tables.combination, true).await;
        let combination_shop = self.table(state, &tables.combination_shop, false).await;
        let link = self.table(state, &tables.combination_link, true).await;
        let product = self.table(state, &tables.product, false).await;
        let product_shop = self.table(state, &tables.product_shop, false).await;

        let (Some(group), Some(group_lang), Some(attribute), Some(attribute_lang), Some(combination), Some(link)) =
            (group, group_lang, attribute, attribute_lang, combination, link)
        else {
            return None;
        };

        Some(Catalog {
            group_id: surrogate_or(&group, "id_attribute_group"),
            attribute_id: surrogate_or(&attribute, "id_attribute"),
            combination_id: surrogate_or(&combination, "id_product_attribute"),
            product_id: product
                .as_deref()
                .map(|p| surrogate_or(p, "id_product"))
                .unwrap_or_else(|| "id_product".to_string()),
            group,
            group_lang,
            group_shop,
            attribute,
            attribute_lang,
            attribute_shop,
            combination,
            combination_shop,
            link,
            product,
            product_shop,
        })
    }

    async fn table(
        &self,
        state: &mut RunState,
        entity: &str,
        required: bool,
    ) -> Option<Arc<TableSchema>> {
        let physical = self.env.physical(entity);
        let schema = state.schema.table(&physical).await;
        if schema.is_none() && required {
            state.diagnostics.push(Diagnostic::new(
                DiagnosticKind::MissingTable,
                &physical,
                "required by the combination builder",
            ));
        }
        schema
    }

    // ===== Groups and values =====

    async fn ensure_group(
        &self,
        state: &mut RunState,
        catalog: &Catalog,
        def: &GroupDef<'_>,
    ) -> Result<i64, Diagnostic> {
        let cache_key = normalize_key(&def.label);
        if let Some(id) = state.groups.get(&cache_key) {
            return Ok(*id);
        }
        let id_col = &catalog.group_id;

        if catalog.group_lang.has_column("name") {
            for candidate in legacy_variants(&def.label) {
                let rows = self
                    .env
                    .select_rows(
                        &catalog.group_lang.name,
                        slice::from_ref(id_col),
                        &row([("name", candidate.as_str())]),
                    )
                    .await?;
                if let Some(id) = first_id(&rows, id_col) {
                    debug!("Attribute group '{}' found as '{}' ({})", def.label, candidate, id);
                    state.groups.insert(cache_key, id);
                    return Ok(id);
                }
            }
        }

        let position = self
            .env
            .select_rows(&catalog.group.name, slice::from_ref(id_col), &Row::new())
            .await?
            .len();
        let group_row = self.catalog_row(
            state,
            &catalog.group,
            &[
                ("is_color_group", json!(i64::from(def.group_type == "color"))),
                ("group_type", json!(def.group_type)),
                ("position", json!(position)),
            ],
            None,
        );
        let id = self.insert_generated(state, &catalog.group, &group_row).await?;
        info!("Created attribute group '{}' ({})", def.label, id);

        let public_name = def
            .public_name
            .and_then(|spec| {
                Resolver::new(self.record)
                    .with_primary(self.env.primary)
                    .resolve(spec)
            })
            .map(|v| value_to_text(&v))
            .unwrap_or_else(|| def.label.clone());
        let tables = &self.env.sync.variant_tables;
        self.write_satellites(
            state,
            &catalog.group_lang,
            &tables.attribute_group_lang,
            &[
                (id_col.as_str(), json!(id)),
                ("name", json!(def.label)),
                ("public_name", json!(public_name)),
            ],
        )
        .await?;
        if let Some(shop) = &catalog.group_shop {
            self.write_satellites(
                state,
                shop,
                &tables.attribute_group_shop,
                &[(id_col.as_str(), json!(id))],
            )
            .await?;
        }

        state.groups.insert(cache_key, id);
        Ok(id)
    }

    async fn ensure_attribute(
        &self,
        state: &mut RunState,
        catalog: &Catalog,
        def: &GroupDef<'_>,
        group_id: i64,
        value: &str,
    ) -> Result<i64, Diagnostic> {
        let cache_key = (group_id, normalize_key(value));
        if let Some(id) = state.attributes.get(&cache_key) {
            return Ok(*id);
        }
        let id_col = &catalog.attribute_id;
        let group_col = &catalog.group_id;

        if catalog.attribute_lang.has_column("name") {
            for candidate in legacy_variants(value) {
                let rows = self
                    .env
                    .select_rows(
                        &catalog.attribute_lang.name,
                        slice::from_ref(id_col),
                        &row([("name", candidate.as_str())]),
                    )
                    .await?;
                for id in ids(&rows, id_col) {
                    let owner = row([(id_col.as_str(), id), (group_col.as_str(), group_id)]);
                    let owned = self
                        .env
                        .select_rows(&catalog.attribute.name, slice::from_ref(id_col), &owner)
                        .await?;
                    if !owned.is_empty() {
                        state.attributes.insert(cache_key, id);
                        return Ok(id);
                    }
                }
            }
        }

        let position = self
            .env
            .select_rows(
                &catalog.attribute.name,
                slice::from_ref(id_col),
                &row([(group_col.as_str(), group_id)]),
            )
            .await?
            .len();
        let color = if def.group_type == "color" && value.starts_with('#') {
            value
        } else {
            ""
        };
        let attribute_row = self.catalog_row(
            state,
            &catalog.attribute,
            &[
                (group_col.as_str(), json!(group_id)),
                ("color", json!(color)),
                ("position", json!(position)),
            ],
            None,
        );
        let id = self
            .insert_generated(state, &catalog.attribute, &attribute_row)
            .await?;
        info!("Created attribute '{}' in group '{}' ({})", value, def.label, id);

        let tables = &self.env.sync.variant_tables;
        self.write_satellites(
            state,
            &catalog.attribute_lang,
            &tables.attribute_lang,
            &[(id_col.as_str(), json!(id)), ("name", json!(value))],
        )
        .await?;
        if let Some(shop) = &catalog.attribute_shop {
            self.write_satellites(state, shop, &tables.attribute_shop, &[(id_col.as_str(), json!(id))])
                .await?;
        }

        state.attributes.insert(cache_key, id);
        Ok(id)
    }

    // ===== Per variant =====

    async fn build_variant(
        &self,
        state: &mut RunState,
        catalog: &Catalog,
        groups: &[GroupDef<'_>],
        group_ids: &[Option<i64>],
        variant: &Value,
    ) -> VariantOutcome {
        let meta = self
            .env
            .meta(state.run_id, Some(self.product_id), &ScopeTuple::default());
        let resolver = Resolver::new(self.record)
            .with_primary(self.env.primary)
            .with_item(variant)
            .with_meta(&meta);

        let reference = resolver
            .resolve(&self.spec.reference)
            .map(|v| value_to_text(&v));
        let mut outcome = VariantOutcome {
            reference: reference.clone(),
            combination_id: None,
            stage: VariantStage::Pending,
            created: false,
            failed: None,
        };

        let (combination_id, created) =
            match self.locate_or_create(state, catalog, reference.as_deref()).await {
                Ok(found) => found,
                Err(diagnostic) => return abandon(state, outcome, diagnostic),
            };
        outcome.combination_id = Some(combination_id);
        outcome.created = created;
        outcome.stage = if created {
            VariantStage::Created
        } else {
            VariantStage::Located
        };

        let attributes = self.attributes_of(variant);
        for (def, group_id) in groups.iter().zip(group_ids) {
            let value = match def.value {
                Some(spec) => resolver.resolve(spec),
                None => attributes
                    .as_ref()
                    .and_then(|a| lookup_attribute(a, &def.key))
                    .and_then(sanitize),
            }
            .map(|v| value_to_text(&v));
            let Some(value) = value else {
                debug!("Variant has no value for group '{}'", def.label);
                continue;
            };
            if let Err(diagnostic) = self
                .link_value(state, catalog, def, *group_id, &value, combination_id)
                .await
            {
                return abandon(state, outcome, diagnostic);
            }
        }
        outcome.stage = VariantStage::Linked;

        if let Err(diagnostic) = self
            .apply_combination_fields(state, catalog, &resolver, combination_id)
            .await
        {
            return abandon(state, outcome, diagnostic);
        }
        if let Some(shop) = &catalog.combination_shop {
            if let Err(diagnostic) = self
                .write_shop_rows(state, catalog, shop, &resolver, combination_id)
                .await
            {
                return abandon(state, outcome, diagnostic);
            }
        }
        outcome.stage = VariantStage::FieldsApplied;
        outcome
    }

    /// Existing combination of this product with the same reference, or a new one.
    async fn locate_or_create(
        &self,
        state: &mut RunState,
        catalog: &Catalog,
        reference: Option<&str>,
    ) -> Result<(i64, bool), Diagnostic> {
        let schema = &catalog.combination;
        let id_col = &catalog.combination_id;
        let has_reference = schema.has_column("reference");

        if let Some(reference) = reference.filter(|_| has_reference) {
            let filter = row([
                (catalog.product_id.as_str(), SqlValue::Int(self.product_id)),
                ("reference", SqlValue::from(reference)),
            ]);
            let existing = self
                .env
                .select_rows(&schema.name, slice::from_ref(id_col), &filter)
                .await?;
            if let Some(id) = first_id(&existing, id_col) {
                debug!("Combination '{}' located ({})", reference, id);
                return Ok((id, false));
            }
        }

        let mut pairs = vec![(catalog.product_id.as_str(), json!(self.product_id))];
        if let Some(reference) = reference {
            pairs.push(("reference", json!(reference)));
        }
        let combination_row = self.catalog_row(state, schema, &pairs, None);
        let id = self.insert_generated(state, schema, &combination_row).await?;
        state.ids.record_generated(
            &self.env.sync.variant_tables.combination,
            id_col,
            id,
            false,
        );
        Ok((id, true))
    }

    /// Ensure the value and link it, replacing any other value of the same group.
    async fn link_value(
        &self,
        state: &mut RunState,
        catalog: &Catalog,
        def: &GroupDef<'_>,
        group_id: Option<i64>,
        value: &str,
        combination_id: i64,
    ) -> Result<(), Diagnostic> {
        let group_id = group_id.filter(|id| *id > 0);
        let attribute_id = match group_id {
            Some(gid) => match self.ensure_attribute(state, catalog, def, gid, value).await {
                Ok(id) => Some(id).filter(|id| *id > 0),
                Err(diagnostic) => {
                    state.diagnostics.push(diagnostic);
                    None
                }
            },
            None => None,
        };
        let (Some(group_id), Some(attribute_id)) = (group_id, attribute_id) else {
            state.diagnostics.push(Diagnostic::new(
                DiagnosticKind::LinkSkipped,
                &catalog.link.name,
                format!(
                    "group '{}' value '{}' did not resolve to an id",
                    def.label, value
                ),
            ));
            return Ok(());
        };

        let attr_col = catalog.attribute_id.as_str();
        let combo_col = catalog.combination_id.as_str();
        let linked = self
            .env
            .select_rows(
                &catalog.link.name,
                slice::from_ref(&catalog.attribute_id),
                &row([(combo_col, combination_id)]),
            )
            .await?;
        for stale in ids(&linked, attr_col).filter(|id| *id != attribute_id) {
            let same_group = self
                .env
                .select_rows(
                    &catalog.attribute.name,
                    slice::from_ref(&catalog.attribute_id),
                    &row([(attr_col, stale), (catalog.group_id.as_str(), group_id)]),
                )
                .await?;
            if same_group.is_empty() {
                continue;
            }
            let at = WriteTarget::new(state.run_id, &catalog.link.name);
            self.env
                .delete_rows(&at, &row([(attr_col, stale), (combo_col, combination_id)]))
                .await?;
            debug!(
                "Unlinked attribute {} from combination {}",
                stale, combination_id
            );
        }

        let at = WriteTarget::new(state.run_id, &catalog.link.name);
        self.env
            .upsert_row(
                &at,
                &row([(attr_col, attribute_id), (combo_col, combination_id)]),
                &catalog.link.primary_key,
                &[],
                None,
                WriteAction::Linked,
            )
            .await?;
        Ok(())
    }

    async fn apply_combination_fields(
        &self,
        state: &mut RunState,
        catalog: &Catalog,
        resolver: &Resolver<'_>,
        combination_id: i64,
    ) -> Result<(), Diagnostic> {
        let schema = &catalog.combination;
        let mut draft = draft_fields(
            schema,
            &self.spec.combination,
            &IndexMap::new(),
            resolver,
            !self.env.ctx.strict_mapping,
        );
        draft.remove(&catalog.combination_id);
        draft.remove(&catalog.product_id);
        if draft.is_empty() {
            return Ok(());
        }

        let mut finalized = finalize(schema, draft, NumericPolicy::Omit);
        push_notes(state, &finalized, None);
        let filter = row([(catalog.combination_id.as_str(), combination_id)]);
        if !finalized.fill_only.is_empty() {
            let existing = self.env.select_rows(&schema.name, &[], &filter).await?;
            if let Some(current) = existing.first() {
                finalized.retain_fillable(current);
            }
        }
        if finalized.row.is_empty() {
            return Ok(());
        }

        let at = WriteTarget::new(state.run_id, &schema.name);
        self.env
            .update_row(&at, &finalized.row, &filter, Some(&finalized.origins))
            .await?;
        Ok(())
    }

    /// Per-store combination rows, with the variant (or existing row) as item.
    async fn write_shop_rows(
        &self,
        state: &mut RunState,
        catalog: &Catalog,
        schema: &TableSchema,
        resolver: &Resolver<'_>,
        combination_id: i64,
    ) -> Result<(), Diagnostic> {
        let entity = &self.env.sync.variant_tables.combination_shop;
        let binding: &TableBinding = &self.spec.combination_shop;
        let tuples = match self
            .env
            .planner()
            .plan(entity, schema, &binding.settings, &mut state.languages, self.env.store)
            .await
        {
            Ok(tuples) => tuples,
            Err(diagnostic) => {
                state.diagnostics.push(diagnostic);
                return Ok(());
            }
        };

        for tuple in &tuples {
            let mut draft = draft_fields(
                schema,
                binding,
                &IndexMap::new(),
                resolver,
                !self.env.ctx.strict_mapping,
            );
            for (column, id) in tuple.columns(schema, &self.env.sync.axis_columns) {
                draft.set(column, Cell::new(id.to_json(), ValueSource::Scope, "scope"));
            }
            draft.set(
                catalog.combination_id.clone(),
                Cell::new(combination_id, ValueSource::Key, "builder"),
            );
            if schema.has_column(&catalog.product_id) {
                draft.set(
                    catalog.product_id.clone(),
                    Cell::new(self.product_id, ValueSource::Key, "builder"),
                );
            }

            let finalized = finalize(schema, draft, NumericPolicy::Zero);
            push_notes(state, &finalized, Some(tuple));
            let at = WriteTarget::new(state.run_id, &schema.name).at(tuple);
            self.env
                .upsert_row(
                    &at,
                    &finalized.row,
                    &schema.primary_key,
                    &finalized.fill_only,
                    Some(&finalized.origins),
                    WriteAction::Upserted,
                )
                .await?;
        }
        Ok(())
    }

    // ===== Product-level passes =====

    async fn apply_default(
        &self,
        state: &mut RunState,
        catalog: &Catalog,
        combination_id: i64,
    ) -> Result<(), Diagnostic> {
        let product_col = catalog.product_id.as_str();
        let by_product = row([(product_col, self.product_id)]);
        let by_combination = row([(catalog.combination_id.as_str(), combination_id)]);

        for schema in [Some(&catalog.combination), catalog.combination_shop.as_ref()]
            .into_iter()
            .flatten()
        {
            let Some(flag) = schema.get("default_on") else {
                continue;
            };
            let cleared = if flag.is_nullable {
                SqlValue::Null
            } else {
                SqlValue::Int(0)
            };
            let at = WriteTarget::new(state.run_id, &schema.name);
            if schema.has_column(product_col) {
                self.env
                    .update_row(&at, &row([("default_on", cleared)]), &by_product, None)
                    .await?;
            }
            self.env
                .update_row(&at, &row([("default_on", 1)]), &by_combination, None)
                .await?;
        }

        for schema in [catalog.product.as_ref(), catalog.product_shop.as_ref()]
            .into_iter()
            .flatten()
        {
            if !schema.has_column("cache_default_attribute") || !schema.has_column(product_col) {
                continue;
            }
            let at = WriteTarget::new(state.run_id, &schema.name);
            self.env
                .update_row(
                    &at,
                    &row([("cache_default_attribute", combination_id)]),
                    &by_product,
                    None,
                )
                .await?;
        }

        info!(
            "Default combination of product {} is {}",
            self.product_id, combination_id
        );
        Ok(())
    }

    /// Re-apply per-store fields to every other combination of the product.
    async fn map_all(&self, state: &mut RunState, catalog: &Catalog, touched: &[i64]) {
        let Some(schema) = catalog.combination_shop.clone() else {
            return;
        };
        let existing = match self
            .env
            .select_rows(
                &catalog.combination.name,
                &[],
                &row([(catalog.product_id.as_str(), self.product_id)]),
            )
            .await
        {
            Ok(rows) => rows,
            Err(diagnostic) => {
                state.diagnostics.push(diagnostic);
                return;
            }
        };

        let meta = self
            .env
            .meta(state.run_id, Some(self.product_id), &ScopeTuple::default());
        let mut applied = 0;
        for current in &existing {
            let Some(id) = current
                .get(&catalog.combination_id)
                .and_then(SqlValue::as_i64)
            else {
                continue;
            };
            if touched.contains(&id) {
                continue;
            }
            let item = Value::Object(
                current
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            );
            let resolver = Resolver::new(self.record)
                .with_primary(self.env.primary)
                .with_item(&item)
                .with_meta(&meta);
            match self
                .write_shop_rows(state, catalog, &schema, &resolver, id)
                .await
            {
                Ok(()) => applied += 1,
                Err(diagnostic) => state.diagnostics.push(diagnostic),
            }
        }
        debug!("Map-all pass updated {} existing combination(s)", applied);
    }

    // ===== Helpers =====

    /// Finalize a builder-made row (truncation applies, unknown columns drop).
    fn catalog_row(
        &self,
        state: &mut RunState,
        schema: &TableSchema,
        pairs: &[(&str, Value)],
        tuple: Option<&ScopeTuple>,
    ) -> Finalized {
        let mut draft = RowDraft::new();
        for (column, value) in pairs {
            draft.set(*column, Cell::new(value.clone(), ValueSource::Fixed, "builder"));
        }
        if let Some(tuple) = tuple {
            for (column, id) in tuple.columns(schema, &self.env.sync.axis_columns) {
                draft.set(column, Cell::new(id.to_json(), ValueSource::Scope, "scope"));
            }
        }
        let finalized = finalize(schema, draft, NumericPolicy::Neutral);
        push_notes(state, &finalized, tuple);
        finalized
    }

    async fn insert_generated(
        &self,
        state: &mut RunState,
        schema: &TableSchema,
        finalized: &Finalized,
    ) -> Result<i64, Diagnostic> {
        let at = WriteTarget::new(state.run_id, &schema.name);
        self.env
            .insert_row(&at, &finalized.row, Some(&finalized.origins))
            .await?
            .filter(|id| *id > 0)
            .ok_or_else(|| {
                Diagnostic::new(
                    DiagnosticKind::WriteFailed,
                    &schema.name,
                    "insert returned no generated key",
                )
            })
    }

    /// Upsert one row per scope tuple of a lang/shop satellite table.
    async fn write_satellites(
        &self,
        state: &mut RunState,
        schema: &TableSchema,
        entity: &str,
        pairs: &[(&str, Value)],
    ) -> Result<(), Diagnostic> {
        let settings = ScopeSettings::default();
        let tuples = match self
            .env
            .planner()
            .plan(entity, schema, &settings, &mut state.languages, self.env.store)
            .await
        {
            Ok(tuples) => tuples,
            Err(diagnostic) => {
                state.diagnostics.push(diagnostic);
                return Ok(());
            }
        };
        for tuple in &tuples {
            let finalized = self.catalog_row(state, schema, pairs, Some(tuple));
            let at = WriteTarget::new(state.run_id, &schema.name).at(tuple);
            self.env
                .upsert_row(
                    &at,
                    &finalized.row,
                    &schema.primary_key,
                    &[],
                    Some(&finalized.origins),
                    WriteAction::Upserted,
                )
                .await?;
        }
        Ok(())
    }
}

fn abandon(state: &mut RunState, mut outcome: VariantOutcome, diagnostic: Diagnostic) -> VariantOutcome {
    outcome.failed = Some(diagnostic.detail.clone());
    state.diagnostics.push(diagnostic);
    outcome
}

fn push_notes(state: &mut RunState, finalized: &Finalized, tuple: Option<&ScopeTuple>) {
    for note in &finalized.notes {
        let note = match tuple {
            Some(tuple) => note.clone().at(tuple),
            None => note.clone(),
        };
        state.diagnostics.push(note);
    }
}

fn surrogate_or(schema: &TableSchema, fallback: &str) -> String {
    schema
        .surrogate_key()
        .map(|c| c.name.clone())
        .unwrap_or_else(|| fallback.to_string())
}

fn ids<'r>(rows: &'r [Row], column: &'r str) -> impl Iterator<Item = i64> + 'r {
    rows.iter()
        .filter_map(move |r| r.get(column).and_then(SqlValue::as_i64))
}

fn first_id(rows: &[Row], column: &str) -> Option<i64> {
    ids(rows, column).next()
}
