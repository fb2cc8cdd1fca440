use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

use super::{SubFlow, SubFlowInput, SubFlowOutcome, SubFlowOutput, require_assessment};
use crate::{
    config::PurchaseConfig,
    error::Result,
    services::{ProductSearch, SearchHit, bounded},
    session::SessionState,
};

pub const PURCHASES: &str = "purchases";
pub const PRICE_NOTE: &str = "Check website for price";

/// One place a medication can be bought
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOption {
    pub display_name: String,
    pub source: String,
    pub url: String,
    pub price_note: String,
}

impl PurchaseOption {
    fn from_hit(medication: &str, hit: &SearchHit) -> Self {
        let source = Url::parse(&hit.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "Unknown".to_string());
        let url = if hit.url.is_empty() {
            "#".to_string()
        } else {
            hit.url.clone()
        };

        Self {
            display_name: format!("{} from {}", capitalize(medication), source),
            source,
            url,
            price_note: PRICE_NOTE.to_string(),
        }
    }
}

/// Purchase options for a single extracted medication; empty when nothing was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationPurchases {
    pub medication: String,
    pub options: Vec<PurchaseOption>,
}

pub struct PurchaseLookupFlow {
    products: Arc<dyn ProductSearch>,
    config: PurchaseConfig,
    timeout: Duration,
}

impl PurchaseLookupFlow {
    pub fn new(products: Arc<dyn ProductSearch>, config: PurchaseConfig, timeout: Duration) -> Self {
        Self {
            products,
            config,
            timeout,
        }
    }

    /// Query restricted to the configured pharmacy domains
    pub fn search_query(&self, medication: &str) -> String {
        let sites = self
            .config
            .pharmacy_sites
            .iter()
            .map(|site| format!("site:{site}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        if sites.is_empty() {
            medication.to_string()
        } else {
            format!("{medication} {sites}")
        }
    }

    async fn lookup(&self, medication: &str, warnings: &mut Vec<String>) -> MedicationPurchases {
        let query = self.search_query(medication);
        let options = match bounded(self.timeout, self.products.search(&query, self.config.limit)).await
        {
            Ok(hits) => hits
                .iter()
                .take(self.config.limit)
                .map(|hit| PurchaseOption::from_hit(medication, hit))
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!(medication, error = %e, "Product search failed");
                Vec::new()
            }
        };

        if options.is_empty() {
            warnings.push(format!(
                "Could not find purchase options for {medication}. Please check local pharmacies."
            ));
        }

        MedicationPurchases {
            medication: medication.to_string(),
            options,
        }
    }
}

#[async_trait]
impl SubFlow for PurchaseLookupFlow {
    fn id(&self) -> &str {
        PURCHASES
    }

    async fn run(&self, state: &mut SessionState, _input: &SubFlowInput) -> Result<SubFlowOutcome> {
        require_assessment(state, self.id())?;
        let medications: Vec<String> = state.medications().iter().cloned().collect();

        info!(count = medications.len(), "Looking up purchase options");

        let mut warnings = Vec::new();
        let mut results = Vec::with_capacity(medications.len());
        for medication in &medications {
            results.push(self.lookup(medication, &mut warnings).await);
        }

        state.record_purchases(results.clone());

        let found = results.iter().filter(|m| !m.options.is_empty()).count();
        info!(found, missing = results.len() - found, "Purchase lookup finished");

        Ok(SubFlowOutcome::new(SubFlowOutput::Purchases {
            medications: results,
        })
        .with_warnings(warnings))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
