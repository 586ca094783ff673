use mender_adapters::config::OracleSettings;
use std::collections::HashMap;

/// Oracle tiers, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelTier {
    Speed,
    Balanced,
    Smart,
}

/// Completion cap shared by all tiers; replies are edit lists, not files.
const MODEL_MAX_TOKENS: u32 = 8_000;

impl ModelTier {
    pub fn default_id(&self) -> &'static str {
        match self {
            ModelTier::Speed => "openai/gpt-4o-mini",
            ModelTier::Balanced => "openai/gpt-4.1-mini",
            ModelTier::Smart => "openai/gpt-4.1",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Speed => "speed",
            ModelTier::Balanced => "balanced",
            ModelTier::Smart => "smart",
        }
    }

    pub fn max_tokens(&self) -> u32 {
        MODEL_MAX_TOKENS
    }
}

/// Model ids for each tier, after `mender.toml` overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    speed: String,
    balanced: String,
    smart: String,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            speed: ModelTier::Speed.default_id().to_string(),
            balanced: ModelTier::Balanced.default_id().to_string(),
            smart: ModelTier::Smart.default_id().to_string(),
        }
    }
}

impl ModelCatalog {
    pub fn from_settings(settings: &OracleSettings) -> Self {
        let pick = |configured: &Option<String>, tier: ModelTier| {
            configured
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .unwrap_or(tier.default_id())
                .to_string()
        };
        Self {
            speed: pick(&settings.speed_model, ModelTier::Speed),
            balanced: pick(&settings.balanced_model, ModelTier::Balanced),
            smart: pick(&settings.smart_model, ModelTier::Smart),
        }
    }

    pub fn id(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Speed => &self.speed,
            ModelTier::Balanced => &self.balanced,
            ModelTier::Smart => &self.smart,
        }
    }
}

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

const DEFAULT_PRICES: [(&str, ModelPrice); 3] = [
    ("openai/gpt-4o-mini", ModelPrice::new(0.15, 0.60)),
    ("openai/gpt-4.1-mini", ModelPrice::new(0.40, 1.60)),
    ("openai/gpt-4.1", ModelPrice::new(2.00, 8.00)),
];

/// Static per-model prices. Models missing from the table are charged at
/// the most expensive known rate so the ceiling is never underestimated.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            prices: DEFAULT_PRICES
                .iter()
                .map(|(id, price)| (id.to_string(), *price))
                .collect(),
        }
    }
}

impl PriceTable {
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    pub fn with_price(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.prices.insert(model.into(), price);
        self
    }

    pub fn price_for(&self, model: &str) -> ModelPrice {
        if let Some(price) = self.prices.get(model) {
            return *price;
        }
        self.prices
            .values()
            .copied()
            .fold(None, |worst: Option<ModelPrice>, p| match worst {
                Some(w) if w.output_per_million >= p.output_per_million => Some(w),
                _ => Some(p),
            })
            .unwrap_or(DEFAULT_PRICES[2].1)
    }

    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.price_for(model).cost(input_tokens, output_tokens)
    }
}
