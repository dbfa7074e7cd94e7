//! Action pricing and cost resolution.
//!
//! A [`CostSpec`] maps each action to pricing slots keyed by [`PriceKey`]:
//! the `default` sentinel or a tier name. Each slot holds either a fixed
//! price or a formula. The JSON form keeps slots as plain object keys:
//!
//! ```json
//! {
//!   "ai-completion": {
//!     "default": "{token}*0.001+10",
//!     "premium": "{token}*0.0008+8"
//!   },
//!   "image-gen": { "default": 25 }
//! }
//! ```
//!
//! Prices are carried as major units (a `10` means 10.00) and resolved to
//! integer cents. Negative results clamp to zero and rounding is
//! half-away-from-zero on the cents boundary.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{CreditError, Result};
use crate::expr::{self, ParsedFormula};

/// A pricing slot key: the `default` sentinel or a tier name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriceKey {
    /// The fallback slot every action must define.
    Default,

    /// A tier-specific slot.
    Tier(String),
}

impl PriceKey {
    /// The slot label as it appears in configuration.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Default => "default",
            Self::Tier(name) => name,
        }
    }

    /// Parse a slot label; `"default"` is the sentinel, anything else a
    /// tier name.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        if label == "default" {
            Self::Default
        } else {
            Self::Tier(label.to_owned())
        }
    }
}

impl std::fmt::Display for PriceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PriceKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PriceKey {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

/// One pricing slot: a fixed price in major units, or a formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceEntry {
    /// A fixed non-negative price.
    Fixed(f64),

    /// A formula evaluated against caller-supplied variables.
    Formula(String),
}

/// Pricing slots for one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionPricing {
    slots: BTreeMap<PriceKey, PriceEntry>,
}

impl ActionPricing {
    /// Start from the mandatory default slot.
    #[must_use]
    pub fn new(default: PriceEntry) -> Self {
        let mut slots = BTreeMap::new();
        slots.insert(PriceKey::Default, default);
        Self { slots }
    }

    /// Add a tier-specific slot.
    #[must_use]
    pub fn with_tier(mut self, tier: impl Into<String>, entry: PriceEntry) -> Self {
        self.slots.insert(PriceKey::Tier(tier.into()), entry);
        self
    }
}

/// Immutable per-action pricing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostSpec {
    actions: BTreeMap<String, ActionPricing>,
}

impl CostSpec {
    /// An empty spec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add pricing for an action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>, pricing: ActionPricing) -> Self {
        self.actions.insert(action.into(), pricing);
        self
    }

    /// Validate the whole spec: every action needs a default slot, fixed
    /// prices must be finite and non-negative, and every formula must pass
    /// formula validation.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::InvalidCostSpec` naming the offending action
    /// and slot.
    pub fn validate(&self) -> Result<()> {
        for (action, pricing) in &self.actions {
            if !pricing.slots.contains_key(&PriceKey::Default) {
                return Err(CreditError::InvalidCostSpec {
                    action: action.clone(),
                    detail: "no default price".into(),
                });
            }
            for (key, entry) in &pricing.slots {
                match entry {
                    PriceEntry::Fixed(price) => {
                        if !price.is_finite() || *price < 0.0 {
                            return Err(CreditError::InvalidCostSpec {
                                action: action.clone(),
                                detail: format!("slot '{key}' has invalid fixed price {price}"),
                            });
                        }
                    }
                    PriceEntry::Formula(source) => {
                        expr::validate(source).map_err(|e| CreditError::InvalidCostSpec {
                            action: action.clone(),
                            detail: format!("slot '{key}': {e}"),
                        })?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// How a price came to be, embedded verbatim in ledger metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// The formula that was evaluated, if the path was dynamic.
    pub formula: Option<String>,

    /// The variables the caller supplied, if any.
    pub variables: Option<BTreeMap<String, f64>>,

    /// Evaluation result before clamping and rounding. May be negative.
    pub raw_price: f64,

    /// Final price in major units, after clamp and round.
    pub final_price: f64,

    /// Final price in cents. This is what gets charged.
    pub final_cents: i64,

    /// Whether a formula was actually evaluated.
    pub dynamic: bool,
}

/// Resolves prices for (action, tier, variables) against a validated
/// [`CostSpec`].
///
/// Formulas are compiled once at construction and cached by exact source
/// string; the cache tolerates concurrent lookup and idempotent insert.
pub struct CostResolver {
    spec: CostSpec,
    cache: RwLock<HashMap<String, Arc<ParsedFormula>>>,
}

impl CostResolver {
    /// Validate the pricing spec and pre-compile every formula in it.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::InvalidCostSpec` if validation fails.
    pub fn new(spec: CostSpec) -> Result<Self> {
        spec.validate()?;

        let mut cache = HashMap::new();
        for pricing in spec.actions.values() {
            for entry in pricing.slots.values() {
                if let PriceEntry::Formula(source) = entry {
                    if !cache.contains_key(source) {
                        cache.insert(source.clone(), Arc::new(expr::parse(source)?));
                    }
                }
            }
        }

        Ok(Self {
            spec,
            cache: RwLock::new(cache),
        })
    }

    /// Resolve the price for an action in cents.
    ///
    /// # Errors
    ///
    /// Same as [`CostResolver::explain`].
    pub fn resolve(
        &self,
        action: &str,
        tier: Option<&str>,
        vars: Option<&BTreeMap<String, f64>>,
    ) -> Result<i64> {
        Ok(self.explain(action, tier, vars)?.final_cents)
    }

    /// Resolve the price for an action with its full breakdown.
    ///
    /// Lookup takes the tier slot when the caller has a tier and the action
    /// defines that slot, else the default slot. A formula slot met without
    /// variables falls back to the default slot only when that default is a
    /// fixed price; otherwise the formula is evaluated and a missing
    /// variable surfaces from evaluation.
    ///
    /// # Errors
    ///
    /// `CreditError::UnknownAction` for an action with no pricing,
    /// `CreditError::Formula` for evaluation failures.
    pub fn explain(
        &self,
        action: &str,
        tier: Option<&str>,
        vars: Option<&BTreeMap<String, f64>>,
    ) -> Result<CostBreakdown> {
        let pricing = self
            .spec
            .actions
            .get(action)
            .ok_or_else(|| CreditError::UnknownAction {
                action: action.to_owned(),
            })?;
        let default = pricing
            .slots
            .get(&PriceKey::Default)
            .ok_or_else(|| CreditError::InvalidCostSpec {
                action: action.to_owned(),
                detail: "no default price".into(),
            })?;
        let entry = tier
            .and_then(|t| pricing.slots.get(&PriceKey::Tier(t.to_owned())))
            .unwrap_or(default);

        match entry {
            PriceEntry::Fixed(price) => Ok(fixed_breakdown(*price)),
            PriceEntry::Formula(source) => {
                let no_vars = vars.map_or(true, BTreeMap::is_empty);
                if no_vars {
                    if let PriceEntry::Fixed(price) = default {
                        return Ok(fixed_breakdown(*price));
                    }
                }
                self.evaluate_formula(source, vars)
            }
        }
    }

    fn evaluate_formula(
        &self,
        source: &str,
        vars: Option<&BTreeMap<String, f64>>,
    ) -> Result<CostBreakdown> {
        let parsed = self.parsed(source)?;
        let empty = BTreeMap::new();
        let raw = parsed.evaluate(vars.unwrap_or(&empty))?;
        let final_cents = to_cents(raw);
        Ok(CostBreakdown {
            formula: Some(source.to_owned()),
            variables: vars.cloned(),
            raw_price: raw,
            final_price: cents_to_price(final_cents),
            final_cents,
            dynamic: true,
        })
    }

    fn parsed(&self, source: &str) -> Result<Arc<ParsedFormula>> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(found) = cache.get(source) {
                return Ok(Arc::clone(found));
            }
        }
        let compiled = Arc::new(expr::parse(source)?);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let entry = cache.entry(source.to_owned()).or_insert(compiled);
        Ok(Arc::clone(entry))
    }
}

fn fixed_breakdown(price: f64) -> CostBreakdown {
    let final_cents = to_cents(price);
    CostBreakdown {
        formula: None,
        variables: None,
        raw_price: price,
        final_price: cents_to_price(final_cents),
        final_cents,
        dynamic: false,
    }
}

// Clamp-then-round boundary between f64 prices and i64 cents.
#[allow(clippy::cast_possible_truncation)]
fn to_cents(raw: f64) -> i64 {
    let clamped = raw.max(0.0);
    (clamped * 100.0).round() as i64
}

#[allow(clippy::cast_precision_loss)]
fn cents_to_price(cents: i64) -> f64 {
    cents as f64 / 100.0
}
