//! The ordered extraction strategy chain.
//!
//! Each strategy looks at one surface of the picker: host attributes,
//! script-visible properties, or the encapsulated subtree. The chain asks
//! them in priority order and keeps the first answer that has at least one
//! endpoint. Endpoints from different strategies are never combined.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::ScoutConfig;
use crate::dom::{InputField, InputKind, PickerElement};
use crate::error::{Result, ScoutError};
use crate::value::{self, Instant, LocalZone, RawValue};

// ── Result types ────────────────────────────────────────────────────────────

/// Which strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Attributes,
    Properties,
    Encapsulated,
    None,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Attributes => "attributes",
            Provenance::Properties => "properties",
            Provenance::Encapsulated => "encapsulated",
            Provenance::None => "none",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = ScoutError;

    /// Parses a strategy name. `none` is not a strategy and is rejected.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "attributes" => Ok(Provenance::Attributes),
            "properties" => Ok(Provenance::Properties),
            "encapsulated" => Ok(Provenance::Encapsulated),
            other => Err(ScoutError::UnknownStrategy(format!("'{}'", other))),
        }
    }
}

/// A check-in/check-out pair plus where it came from.
///
/// `provenance` is [`Provenance::None`] exactly when both endpoints are absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeResult {
    check_in: Option<Instant>,
    check_out: Option<Instant>,
    provenance: Provenance,
    detail: Option<String>,
}

impl DateRangeResult {
    /// The empty result.
    pub fn none() -> Self {
        Self {
            check_in: None,
            check_out: None,
            provenance: Provenance::None,
            detail: None,
        }
    }

    /// A result with at least one endpoint, or `None` if both are absent.
    pub fn found(
        provenance: Provenance,
        check_in: Option<Instant>,
        check_out: Option<Instant>,
    ) -> Option<Self> {
        if provenance == Provenance::None || (check_in.is_none() && check_out.is_none()) {
            return None;
        }
        Some(Self {
            check_in,
            check_out,
            provenance,
            detail: None,
        })
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn check_in(&self) -> Option<Instant> {
        self.check_in
    }

    pub fn check_out(&self) -> Option<Instant> {
        self.check_out
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// The concrete source inside the strategy, e.g. `startDate/endDate`.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn is_found(&self) -> bool {
        self.provenance != Provenance::None
    }
}

// ── Strategies ──────────────────────────────────────────────────────────────

/// One way of reading dates off a picker. Implementations hold only
/// configuration and never keep the element.
pub trait ExtractionStrategy: fmt::Debug + Send + Sync {
    fn provenance(&self) -> Provenance;

    fn extract(&self, element: &dyn PickerElement) -> Option<DateRangeResult>;
}

/// Epoch-seconds text in two host attributes.
#[derive(Debug, Clone)]
pub struct AttributeStrategy {
    from: String,
    to: String,
}

impl AttributeStrategy {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl ExtractionStrategy for AttributeStrategy {
    fn provenance(&self) -> Provenance {
        Provenance::Attributes
    }

    fn extract(&self, element: &dyn PickerElement) -> Option<DateRangeResult> {
        let check_in = element
            .attribute(&self.from)
            .and_then(|s| value::parse_epoch_seconds(&s));
        let check_out = element
            .attribute(&self.to)
            .and_then(|s| value::parse_epoch_seconds(&s));
        DateRangeResult::found(Provenance::Attributes, check_in, check_out)
            .map(|r| r.with_detail(format!("{}/{}", self.from, self.to)))
    }
}

/// A named pair of from/to properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyPair {
    pub from: String,
    pub to: String,
}

impl PropertyPair {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Script-visible properties: a table of pairs, then a two-entry list.
#[derive(Debug, Clone)]
pub struct PropertyStrategy {
    pairs: Vec<PropertyPair>,
    list_property: String,
    zone: LocalZone,
}

impl PropertyStrategy {
    pub fn new(pairs: Vec<PropertyPair>, list_property: impl Into<String>, zone: LocalZone) -> Self {
        Self {
            pairs,
            list_property: list_property.into(),
            zone,
        }
    }

    fn from_pair(&self, element: &dyn PickerElement, pair: &PropertyPair) -> Option<DateRangeResult> {
        let from = element.property(&pair.from);
        let to = element.property(&pair.to);
        if from.is_null() && to.is_null() {
            return None;
        }
        let result = DateRangeResult::found(
            Provenance::Properties,
            value::parse(&from, &self.zone),
            value::parse(&to, &self.zone),
        );
        if result.is_none() {
            trace!(from = %pair.from, to = %pair.to, "property pair present but unparsable");
        }
        result.map(|r| r.with_detail(format!("{}/{}", pair.from, pair.to)))
    }

    fn from_list(&self, element: &dyn PickerElement) -> Option<DateRangeResult> {
        match element.property(&self.list_property) {
            RawValue::List(items) if items.len() == 2 => DateRangeResult::found(
                Provenance::Properties,
                value::parse(&items[0], &self.zone),
                value::parse(&items[1], &self.zone),
            )
            .map(|r| r.with_detail(self.list_property.clone())),
            _ => None,
        }
    }
}

impl ExtractionStrategy for PropertyStrategy {
    fn provenance(&self) -> Provenance {
        Provenance::Properties
    }

    fn extract(&self, element: &dyn PickerElement) -> Option<DateRangeResult> {
        self.pairs
            .iter()
            .find_map(|pair| self.from_pair(element, pair))
            .or_else(|| self.from_list(element))
    }
}

/// Inputs inside the picker's encapsulated subtree.
///
/// Hidden inputs named like `from`/`to` holding epoch seconds are preferred.
/// Missing endpoints fall back to the first visible input labelled
/// `check in`/`check out` (or named like `from`/`to`) holding `MM/DD/YYYY`.
#[derive(Debug, Clone)]
pub struct EncapsulatedStrategy {
    zone: LocalZone,
}

#[derive(Clone, Copy)]
struct Hints {
    name: &'static str,
    label: &'static str,
}

const FROM_HINTS: Hints = Hints {
    name: "from",
    label: "check in",
};
const TO_HINTS: Hints = Hints {
    name: "to",
    label: "check out",
};

impl EncapsulatedStrategy {
    pub fn new(zone: LocalZone) -> Self {
        Self { zone }
    }

    fn hidden(inputs: &[InputField], hints: Hints) -> Option<Instant> {
        let input = inputs
            .iter()
            .find(|i| i.kind == InputKind::Hidden && contains_hint(&i.name, hints.name))?;
        if input.value.is_empty() || !input.value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        value::parse_epoch_seconds(&input.value)
    }

    fn visible(&self, inputs: &[InputField], hints: Hints) -> Option<Instant> {
        let input = inputs.iter().find(|i| {
            i.kind != InputKind::Hidden
                && (contains_hint(&i.placeholder, hints.label)
                    || contains_hint(&i.aria_label, hints.label)
                    || contains_hint(&i.name, hints.name))
        })?;
        value::parse_month_day_year(&input.value, &self.zone)
    }
}

impl ExtractionStrategy for EncapsulatedStrategy {
    fn provenance(&self) -> Provenance {
        Provenance::Encapsulated
    }

    fn extract(&self, element: &dyn PickerElement) -> Option<DateRangeResult> {
        let inputs = element.encapsulated_inputs()?;
        let hidden_in = Self::hidden(&inputs, FROM_HINTS);
        let hidden_out = Self::hidden(&inputs, TO_HINTS);
        let check_in = hidden_in.or_else(|| self.visible(&inputs, FROM_HINTS));
        let check_out = hidden_out.or_else(|| self.visible(&inputs, TO_HINTS));

        let detail = match (
            hidden_in.is_some() || hidden_out.is_some(),
            check_in != hidden_in || check_out != hidden_out,
        ) {
            (true, true) => "hidden+text",
            (true, false) => "hidden",
            _ => "text",
        };
        DateRangeResult::found(Provenance::Encapsulated, check_in, check_out)
            .map(|r| r.with_detail(detail))
    }
}

fn contains_hint(field: &Option<String>, hint: &str) -> bool {
    field
        .as_deref()
        .is_some_and(|s| s.to_ascii_lowercase().contains(hint))
}

// ── Chain ───────────────────────────────────────────────────────────────────

/// Strategies in priority order.
#[derive(Debug)]
pub struct ExtractionChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ExtractionChain {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Build the chain named by `config.strategy_order`.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::UnknownStrategy`] or
    /// [`ScoutError::DuplicateStrategy`] for a malformed order, and any
    /// error from [`ScoutConfig::validate`].
    pub fn from_config(config: &ScoutConfig) -> Result<Self> {
        config.validate()?;
        let zone = config.local_zone()?;
        let strategies = config
            .strategy_order
            .iter()
            .map(|name| {
                let strategy: Box<dyn ExtractionStrategy> = match name.parse::<Provenance>()? {
                    Provenance::Attributes => Box::new(AttributeStrategy::new(
                        &config.from_attribute,
                        &config.to_attribute,
                    )),
                    Provenance::Properties => Box::new(PropertyStrategy::new(
                        config.property_pairs.clone(),
                        &config.list_property,
                        zone,
                    )),
                    Provenance::Encapsulated => Box::new(EncapsulatedStrategy::new(zone)),
                    Provenance::None => return Err(ScoutError::UnknownStrategy(name.clone())),
                };
                Ok(strategy)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(strategies))
    }

    pub fn order(&self) -> Vec<Provenance> {
        self.strategies.iter().map(|s| s.provenance()).collect()
    }

    /// Run the strategies in order and return the first hit, or
    /// [`DateRangeResult::none`].
    pub fn extract(&self, element: &dyn PickerElement) -> DateRangeResult {
        for strategy in &self.strategies {
            if let Some(result) = strategy.extract(element).filter(DateRangeResult::is_found) {
                trace!(provenance = %result.provenance(), "strategy matched");
                return result;
            }
        }
        DateRangeResult::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryElement;
    use chrono::{TimeZone, Utc};

    const TAG: &str = "wdpr-range-datepicker";

    fn chain() -> ExtractionChain {
        let config = ScoutConfig {
            local_timezone: Some("America/New_York".to_string()),
            ..ScoutConfig::default()
        };
        ExtractionChain::from_config(&config).unwrap()
    }

    fn ms(y: i32, mo: u32, d: u32, h: u32) -> Option<Instant> {
        Instant::from_datetime(&Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap())
    }

    #[test]
    fn test_default_order() {
        assert_eq!(
            chain().order(),
            vec![
                Provenance::Attributes,
                Provenance::Properties,
                Provenance::Encapsulated
            ]
        );
    }

    #[test]
    fn test_attributes_win() {
        let el = MemoryElement::new(TAG)
            .with_attribute("date-from", "1718000000")
            .with_attribute("date-to", "1718600000")
            .with_property("startDate", "06/01/2024");
        let r = chain().extract(&el);
        assert_eq!(r.provenance(), Provenance::Attributes);
        assert_eq!(r.check_in().unwrap().millis(), 1_718_000_000_000);
        assert_eq!(r.check_out().unwrap().millis(), 1_718_600_000_000);
        assert_eq!(r.detail(), Some("date-from/date-to"));
    }

    #[test]
    fn test_single_attribute_does_not_fall_through() {
        let el = MemoryElement::new(TAG)
            .with_attribute("date-from", "1718000000")
            .with_property("endDate", "06/15/2024");
        let r = chain().extract(&el);
        assert_eq!(r.provenance(), Provenance::Attributes);
        assert!(r.check_out().is_none());
    }

    #[test]
    fn test_unparsable_attributes_fall_through() {
        let el = MemoryElement::new(TAG)
            .with_attribute("date-from", "")
            .with_attribute("date-to", "soon")
            .with_property("startDate", "06/10/2024");
        assert_eq!(chain().extract(&el).provenance(), Provenance::Properties);
    }

    #[test]
    fn test_property_pair_month_day_year() {
        let el = MemoryElement::new(TAG)
            .with_property("startDate", "06/10/2024")
            .with_property("endDate", "06/15/2024");
        let r = chain().extract(&el);
        assert_eq!(r.provenance(), Provenance::Properties);
        assert_eq!(r.check_in(), ms(2024, 6, 10, 4));
        assert_eq!(r.check_out(), ms(2024, 6, 15, 4));
        assert_eq!(r.detail(), Some("startDate/endDate"));
    }

    #[test]
    fn test_property_pairs_tried_in_table_order() {
        let el = MemoryElement::new(TAG)
            .with_property("valueFrom", 1_718_000_000.0)
            .with_property("from", RawValue::date(&Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap()));
        let r = chain().extract(&el);
        assert_eq!(r.detail(), Some("from/to"));
        assert_eq!(r.check_in(), ms(2024, 1, 2, 3));
    }

    #[test]
    fn test_unparsable_pair_continues_probing() {
        let el = MemoryElement::new(TAG)
            .with_property("dateFrom", "next week")
            .with_property("selectedTo", 1_718_600_000.0);
        let r = chain().extract(&el);
        assert_eq!(r.detail(), Some("selectedFrom/selectedTo"));
        assert!(r.check_in().is_none());
        assert!(r.check_out().is_some());
    }

    #[test]
    fn test_selected_dates_list() {
        let el = MemoryElement::new(TAG).with_property(
            "selectedDates",
            RawValue::List(vec![RawValue::from("06/10/2024"), RawValue::Number(1_718_600_000.0)]),
        );
        let r = chain().extract(&el);
        assert_eq!(r.detail(), Some("selectedDates"));
        assert_eq!(r.check_in(), ms(2024, 6, 10, 4));
        assert_eq!(r.check_out().unwrap().millis(), 1_718_600_000_000);
    }

    #[test]
    fn test_selected_dates_requires_two_entries() {
        let el = MemoryElement::new(TAG).with_property(
            "selectedDates",
            RawValue::List(vec![RawValue::from("06/10/2024")]),
        );
        assert_eq!(chain().extract(&el).provenance(), Provenance::None);
    }

    #[test]
    fn test_encapsulated_hidden_from_only() {
        let el = MemoryElement::new(TAG)
            .with_encapsulated(vec![InputField::hidden("date-from", "1718000000")]);
        let r = chain().extract(&el);
        assert_eq!(r.provenance(), Provenance::Encapsulated);
        assert_eq!(r.check_in().unwrap().millis(), 1_718_000_000_000);
        assert!(r.check_out().is_none());
        assert_eq!(r.detail(), Some("hidden"));
    }

    #[test]
    fn test_encapsulated_hidden_requires_digits() {
        let el = MemoryElement::new(TAG).with_encapsulated(vec![
            InputField::hidden("date-from", "1718000000.5"),
            InputField::hidden("date-to", "1718600000"),
        ]);
        let r = chain().extract(&el);
        assert!(r.check_in().is_none());
        assert!(r.check_out().is_some());
    }

    #[test]
    fn test_encapsulated_visible_fallback() {
        let el = MemoryElement::new(TAG).with_encapsulated(vec![
            InputField::text(None, Some("Check In"), "06/10/2024"),
            InputField::text(None, Some("Check Out"), "06/15/2024"),
        ]);
        let r = chain().extract(&el);
        assert_eq!(r.provenance(), Provenance::Encapsulated);
        assert_eq!(r.check_in(), ms(2024, 6, 10, 4));
        assert_eq!(r.check_out(), ms(2024, 6, 15, 4));
        assert_eq!(r.detail(), Some("text"));
    }

    #[test]
    fn test_encapsulated_mixes_hidden_and_visible_within_strategy() {
        let el = MemoryElement::new(TAG).with_encapsulated(vec![
            InputField::hidden("date-from", "1718000000"),
            InputField::text(Some("stay-to"), None, "06/15/2024"),
        ]);
        let r = chain().extract(&el);
        assert_eq!(r.detail(), Some("hidden+text"));
        assert_eq!(r.check_out(), ms(2024, 6, 15, 4));
    }

    #[test]
    fn test_encapsulated_visible_ignores_hidden_inputs() {
        let el = MemoryElement::new(TAG)
            .with_encapsulated(vec![InputField::hidden("date-from", "06/10/2024")]);
        assert_eq!(chain().extract(&el).provenance(), Provenance::None);
    }

    #[test]
    fn test_no_subtree_no_result() {
        assert_eq!(chain().extract(&MemoryElement::new(TAG)), DateRangeResult::none());
    }

    #[test]
    fn test_custom_order_from_config() {
        let config = ScoutConfig {
            strategy_order: vec!["encapsulated".into(), "attributes".into()],
            ..ScoutConfig::default()
        };
        let chain = ExtractionChain::from_config(&config).unwrap();
        let el = MemoryElement::new(TAG)
            .with_attribute("date-from", "1718000000")
            .with_encapsulated(vec![InputField::hidden("date-to", "1718600000")]);
        assert_eq!(chain.extract(&el).provenance(), Provenance::Encapsulated);
    }

    #[test]
    fn test_unknown_strategy_is_fatal() {
        let config = ScoutConfig {
            strategy_order: vec!["attributes".into(), "telepathy".into()],
            ..ScoutConfig::default()
        };
        assert!(matches!(
            ExtractionChain::from_config(&config),
            Err(ScoutError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_found_rejects_empty() {
        assert!(DateRangeResult::found(Provenance::Attributes, None, None).is_none());
        assert!(DateRangeResult::found(Provenance::None, ms(2024, 1, 1, 0), None).is_none());
    }
}
