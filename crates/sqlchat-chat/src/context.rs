//! Context settings: the region, currency and stage scope applied to every
//! query.
//!
//! Currency is never chosen directly. It is derived from the region on load
//! and on every region change, and both values are persisted together.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use sqlchat_core::{save_json, Currency, KeyValueStore, Region, StageBucket};

use crate::error::ChatError;
use crate::keys;

/// Immutable snapshot of the scope a run executes under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryContext {
    pub region: Region,
    #[serde(rename = "reporting_currency")]
    pub currency: Currency,
    #[serde(rename = "stage_bucket")]
    pub stage: StageBucket,
}

/// Persisted scope filters.
pub struct ContextSettings {
    store: Arc<dyn KeyValueStore>,
    region: Region,
    currency: Currency,
    stage: StageBucket,
}

/// Read a persisted string that may be JSON-encoded or bare.
fn load_text(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(Some(raw)) => Some(serde_json::from_str::<String>(&raw).unwrap_or(raw)),
        Ok(None) => None,
        Err(e) => {
            warn!(key, error = %e, "Failed to read persisted value");
            None
        }
    }
}

impl ContextSettings {
    /// Load from `store`, coercing unknown values to defaults.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let region = load_text(store.as_ref(), keys::REGION)
            .map(|r| Region::parse_lenient(&r))
            .unwrap_or_default();
        let stage = load_text(store.as_ref(), keys::STAGE_BUCKET)
            .map(|s| StageBucket::parse_lenient(&s))
            .unwrap_or_default();
        let currency = region.currency();

        let stored_currency = load_text(store.as_ref(), keys::CURRENCY);
        if stored_currency.as_deref() != Some(currency.code()) {
            if let Err(e) = save_json(store.as_ref(), keys::CURRENCY, &currency) {
                warn!(error = %e, "Failed to persist derived currency");
            }
        }

        debug!(%region, %currency, %stage, "Context settings loaded");
        Self {
            store,
            region,
            currency,
            stage,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn stage(&self) -> StageBucket {
        self.stage
    }

    pub fn snapshot(&self) -> QueryContext {
        QueryContext {
            region: self.region,
            currency: self.currency,
            stage: self.stage,
        }
    }

    /// Change region, re-derive currency and persist both.
    pub fn set_region(&mut self, region: Region) -> Result<(), ChatError> {
        self.region = region;
        self.currency = region.currency();
        save_json(self.store.as_ref(), keys::REGION, &self.region)?;
        save_json(self.store.as_ref(), keys::CURRENCY, &self.currency)?;
        debug!(region = %self.region, currency = %self.currency, "Region changed");
        Ok(())
    }

    pub fn set_stage(&mut self, stage: StageBucket) -> Result<(), ChatError> {
        self.stage = stage;
        save_json(self.store.as_ref(), keys::STAGE_BUCKET, &self.stage)?;
        Ok(())
    }

    /// Set the stage from an external string, coercing unknown values.
    pub fn set_stage_raw(&mut self, raw: &str) -> Result<StageBucket, ChatError> {
        let stage = StageBucket::parse_lenient(raw);
        self.set_stage(stage)?;
        Ok(stage)
    }

    /// Persist all three values.
    pub fn save(&self) -> Result<(), ChatError> {
        save_json(self.store.as_ref(), keys::REGION, &self.region)?;
        save_json(self.store.as_ref(), keys::CURRENCY, &self.currency)?;
        save_json(self.store.as_ref(), keys::STAGE_BUCKET, &self.stage)?;
        Ok(())
    }
}

impl std::fmt::Debug for ContextSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSettings")
            .field("region", &self.region)
            .field("currency", &self.currency)
            .field("stage", &self.stage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlchat_core::MemoryStore;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn test_defaults_on_empty_store() {
        let store = store();
        let ctx = ContextSettings::load(store.clone());
        assert_eq!(ctx.region(), Region::Gbr);
        assert_eq!(ctx.currency(), Currency::Gbp);
        assert_eq!(ctx.stage(), StageBucket::NotApplied);
        assert_eq!(store.get(keys::CURRENCY).unwrap().as_deref(), Some("\"GBP\""));
    }

    #[test]
    fn test_region_change_updates_and_persists_currency() {
        let store = store();
        let mut ctx = ContextSettings::load(store.clone());
        ctx.set_region(Region::Can).unwrap();
        assert_eq!(ctx.currency(), Currency::Cad);
        assert_eq!(store.get(keys::REGION).unwrap().as_deref(), Some("\"CAN\""));
        assert_eq!(store.get(keys::CURRENCY).unwrap().as_deref(), Some("\"CAD\""));

        let reloaded = ContextSettings::load(store);
        assert_eq!(reloaded.region(), Region::Can);
        assert_eq!(reloaded.currency(), Currency::Cad);
    }

    #[test]
    fn test_currency_rederived_from_region_on_load() {
        let store = store();
        store.set(keys::REGION, "\"CAN\"").unwrap();
        store.set(keys::CURRENCY, "\"GBP\"").unwrap();
        let ctx = ContextSettings::load(store.clone());
        assert_eq!(ctx.currency(), Currency::Cad);
        assert_eq!(store.get(keys::CURRENCY).unwrap().as_deref(), Some("\"CAD\""));
    }

    #[test]
    fn test_bare_strings_accepted() {
        let store = store();
        store.set(keys::REGION, "CAN").unwrap();
        store.set(keys::STAGE_BUCKET, "closed_won").unwrap();
        let ctx = ContextSettings::load(store);
        assert_eq!(ctx.region(), Region::Can);
        assert_eq!(ctx.stage(), StageBucket::ClosedWon);
    }

    #[test]
    fn test_unknown_stage_coerced_on_load() {
        let store = store();
        store.set(keys::STAGE_BUCKET, "\"lost\"").unwrap();
        store.set(keys::REGION, "\"FRA\"").unwrap();
        let ctx = ContextSettings::load(store);
        assert_eq!(ctx.stage(), StageBucket::NotApplied);
        assert_eq!(ctx.region(), Region::Gbr);
    }

    #[test]
    fn test_set_stage_raw_coerces() {
        let store = store();
        let mut ctx = ContextSettings::load(store.clone());
        assert_eq!(ctx.set_stage_raw("upside").unwrap(), StageBucket::Upside);
        assert_eq!(ctx.set_stage_raw("nonsense").unwrap(), StageBucket::NotApplied);
        assert_eq!(
            store.get(keys::STAGE_BUCKET).unwrap().as_deref(),
            Some("\"not_applied\"")
        );
    }

    #[test]
    fn test_snapshot_serializes_wire_names() {
        let mut ctx = ContextSettings::load(store());
        ctx.set_stage(StageBucket::Pipeline).unwrap();
        let json = serde_json::to_value(ctx.snapshot()).unwrap();
        assert_eq!(json["region"], "GBR");
        assert_eq!(json["reporting_currency"], "GBP");
        assert_eq!(json["stage_bucket"], "pipeline");
    }
}
