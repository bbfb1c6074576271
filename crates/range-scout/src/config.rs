//! Tunable constants for the engine.
//!
//! Every field has a default matching the production picker, so an empty
//! JSON object is a valid configuration. Malformed values are rejected by
//! [`ScoutConfig::validate`] before anything runs.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};
use crate::format::{FormatMode, Formatter};
use crate::strategy::{PropertyPair, Provenance};
use crate::value::LocalZone;

pub const DEFAULT_PICKER_TAG: &str = "wdpr-range-datepicker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    /// Tag name of the picker element.
    pub picker_tag: String,
    pub from_attribute: String,
    pub to_attribute: String,
    /// Property pairs, tried in order.
    pub property_pairs: Vec<PropertyPair>,
    /// Property holding a two-entry list of endpoints.
    pub list_property: String,
    /// Strategy names in priority order.
    pub strategy_order: Vec<String>,
    pub format_mode: FormatMode,
    /// Append `Z` to UTC renderings.
    pub zone_suffix: bool,
    /// IANA zone for `MM/DD/YYYY` values; unset means the system zone.
    pub local_timezone: Option<String>,
    /// How long one idle attempt waits for the picker.
    pub wait_timeout_ms: u64,
    /// Coarse recheck interval while waiting.
    pub recheck_interval_ms: u64,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            picker_tag: DEFAULT_PICKER_TAG.to_string(),
            from_attribute: "date-from".to_string(),
            to_attribute: "date-to".to_string(),
            property_pairs: vec![
                PropertyPair::new("dateFrom", "dateTo"),
                PropertyPair::new("from", "to"),
                PropertyPair::new("start", "end"),
                PropertyPair::new("startDate", "endDate"),
                PropertyPair::new("valueFrom", "valueTo"),
                PropertyPair::new("selectedFrom", "selectedTo"),
            ],
            list_property: "selectedDates".to_string(),
            strategy_order: vec![
                "attributes".to_string(),
                "properties".to_string(),
                "encapsulated".to_string(),
            ],
            format_mode: FormatMode::UtcClock,
            zone_suffix: true,
            local_timezone: None,
            wait_timeout_ms: 20_000,
            recheck_interval_ms: 2_000,
        }
    }
}

impl ScoutConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ScoutError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could only fail later.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("picker_tag", &self.picker_tag),
            ("from_attribute", &self.from_attribute),
            ("to_attribute", &self.to_attribute),
            ("list_property", &self.list_property),
        ] {
            if value.trim().is_empty() {
                return Err(ScoutError::InvalidConfig(format!("{field} is empty")));
            }
        }

        if self.strategy_order.is_empty() {
            return Err(ScoutError::InvalidConfig(
                "strategy_order is empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for name in &self.strategy_order {
            let provenance: Provenance = name.parse()?;
            if !seen.insert(provenance) {
                return Err(ScoutError::DuplicateStrategy(format!("'{}'", name)));
            }
        }

        if self.property_pairs.is_empty() {
            return Err(ScoutError::InvalidPropertyTable(
                "no property pairs".to_string(),
            ));
        }
        let mut pairs = HashSet::new();
        for pair in &self.property_pairs {
            if pair.from.trim().is_empty() || pair.to.trim().is_empty() {
                return Err(ScoutError::InvalidPropertyTable(format!(
                    "empty name in pair '{}/{}'",
                    pair.from, pair.to
                )));
            }
            if !pairs.insert((&pair.from, &pair.to)) {
                return Err(ScoutError::InvalidPropertyTable(format!(
                    "duplicate pair '{}/{}'",
                    pair.from, pair.to
                )));
            }
        }

        if self.wait_timeout_ms == 0 {
            return Err(ScoutError::InvalidConfig(
                "wait_timeout_ms must be positive".to_string(),
            ));
        }
        if self.recheck_interval_ms == 0 {
            return Err(ScoutError::InvalidConfig(
                "recheck_interval_ms must be positive".to_string(),
            ));
        }

        self.local_zone()?;
        Ok(())
    }

    pub fn local_zone(&self) -> Result<LocalZone> {
        LocalZone::from_name(self.local_timezone.as_deref())
    }

    pub fn formatter(&self) -> Formatter {
        Formatter::new(self.format_mode, self.zone_suffix)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn recheck_interval(&self) -> Duration {
        Duration::from_millis(self.recheck_interval_ms)
    }
}
