//! Deterministic merchant/keyword rules
//!
//! Rules are data: loaded from `rules.toml`, validated against the taxonomy,
//! and tried in file order. The first rule whose pattern and constraints all
//! match decides the category.

use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::config::read_layered;
use crate::error::{Error, Result};
use crate::models::{
    CategorizationResult, CategorySource, Channel, Direction, RawTransactionRecord,
    TransactionMetadata,
};
use crate::taxonomy::Taxonomy;

/// Embedded default rules (compiled into binary)
const DEFAULT_RULES: &str = include_str!("../../../../config/rules.toml");

pub const RULES_FILE: &str = "rules.toml";

pub const DEFAULT_RULE_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Substring match; `|` separates alternatives
    Contains,
    Exact,
    Regex,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Exact => "exact",
            Self::Regex => "regex",
        }
    }
}

/// Which text a rule's pattern is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    /// Counterparty when one was extracted, then the description
    Any,
    /// Counterparty, or the description when no counterparty was extracted
    Counterparty,
    Description,
    Mcc,
}

impl MatchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Counterparty => "counterparty",
            Self::Description => "description",
            Self::Mcc => "mcc",
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Contains(Vec<String>),
    Exact(String),
    Regex(Regex),
}

impl Matcher {
    fn compile(rule: &str, pattern: &str, pattern_type: PatternType) -> Result<Self> {
        match pattern_type {
            PatternType::Contains => {
                let alternatives: Vec<String> = pattern
                    .split('|')
                    .map(|p| p.trim().to_uppercase())
                    .filter(|p| !p.is_empty())
                    .collect();
                if alternatives.is_empty() {
                    return Err(Error::Config(format!("rule '{}' has an empty pattern", rule)));
                }
                Ok(Self::Contains(alternatives))
            }
            PatternType::Exact => Ok(Self::Exact(pattern.trim().to_uppercase())),
            PatternType::Regex => RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map(Self::Regex)
                .map_err(|e| Error::Config(format!("rule '{}' has an invalid regex: {}", rule, e))),
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Contains(alternatives) => {
                let upper = text.to_uppercase();
                alternatives.iter().any(|p| upper.contains(p.as_str()))
            }
            Self::Exact(expected) => text.trim().to_uppercase() == *expected,
            Self::Regex(re) => re.is_match(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub name: String,
    pub pattern: String,
    pub pattern_type: PatternType,
    pub field: MatchField,
    pub channel: Option<Channel>,
    pub direction: Option<Direction>,
    pub category: String,
    pub subcategory: Option<String>,
    pub confidence: f64,
    matcher: Matcher,
}

impl CategoryRule {
    pub fn matches(&self, record: &RawTransactionRecord, metadata: &TransactionMetadata) -> bool {
        if self.direction.is_some_and(|d| d != record.direction) {
            return false;
        }
        if self.channel.is_some() && self.channel != metadata.channel {
            return false;
        }

        let counterparty = metadata.counterparty.as_deref();
        let description = Some(record.description.as_str());
        let candidates: [Option<&str>; 2] = match self.field {
            MatchField::Any => [counterparty, description],
            MatchField::Counterparty => [counterparty.or(description), None],
            MatchField::Description => [description, None],
            MatchField::Mcc => [metadata.mcc.as_deref(), None],
        };

        candidates
            .into_iter()
            .flatten()
            .any(|text| self.matcher.is_match(text))
    }

    pub fn result(&self) -> CategorizationResult {
        CategorizationResult::new(
            self.category.clone(),
            self.subcategory.clone(),
            self.confidence,
            CategorySource::Rule,
        )
    }
}

/// Ordered rule list
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CategoryRule>,
}

impl RuleSet {
    /// Explicit path, then data dir override, then the embedded default
    pub fn load(explicit: Option<&Path>, taxonomy: &Taxonomy) -> Result<Self> {
        let content = read_layered(explicit, RULES_FILE, DEFAULT_RULES)?;
        Self::from_toml_str(&content, taxonomy)
    }

    pub fn embedded(taxonomy: &Taxonomy) -> Result<Self> {
        Self::from_toml_str(DEFAULT_RULES, taxonomy)
    }

    pub fn from_toml_str(content: &str, taxonomy: &Taxonomy) -> Result<Self> {
        let raw: RawRules = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid rules.toml: {}", e)))?;

        let rules = raw
            .rule
            .into_iter()
            .map(|r| r.into_rule(taxonomy))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(count = rules.len(), "Loaded categorization rules");
        Ok(Self { rules })
    }

    /// First rule that matches, in file order
    pub fn first_match(
        &self,
        record: &RawTransactionRecord,
        metadata: &TransactionMetadata,
    ) -> Option<&CategoryRule> {
        self.rules.iter().find(|rule| rule.matches(record, metadata))
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawRules {
    #[serde(default)]
    rule: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    name: String,
    pattern: String,
    pattern_type: Option<PatternType>,
    field: Option<MatchField>,
    channel: Option<String>,
    direction: Option<String>,
    category: String,
    subcategory: Option<String>,
    confidence: Option<f64>,
}

impl RawRule {
    fn into_rule(self, taxonomy: &Taxonomy) -> Result<CategoryRule> {
        let invalid = |reason: String| Error::Config(format!("rule '{}': {}", self.name, reason));

        taxonomy
            .validate(&self.category, self.subcategory.as_deref())
            .map_err(|e| invalid(e.to_string()))?;

        let confidence = self.confidence.unwrap_or(DEFAULT_RULE_CONFIDENCE);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(invalid(format!("confidence {} is outside 0..1", confidence)));
        }

        let channel = self
            .channel
            .as_deref()
            .map(str::parse::<Channel>)
            .transpose()
            .map_err(invalid)?;
        let direction = self
            .direction
            .as_deref()
            .map(str::parse::<Direction>)
            .transpose()
            .map_err(invalid)?;

        let pattern_type = self.pattern_type.unwrap_or(PatternType::Contains);
        let matcher = Matcher::compile(&self.name, &self.pattern, pattern_type)?;

        Ok(CategoryRule {
            name: self.name,
            pattern: self.pattern,
            pattern_type,
            field: self.field.unwrap_or(MatchField::Any),
            channel,
            direction,
            category: self.category,
            subcategory: self.subcategory,
            confidence,
            matcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataExtractor;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn record(description: &str, direction: Direction) -> RawTransactionRecord {
        RawTransactionRecord {
            batch_id: "b1".into(),
            row_number: 1,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            amount: Decimal::new(45000, 2),
            direction,
            description: description.into(),
            reference: None,
        }
    }

    fn categorize(rules: &RuleSet, description: &str, direction: Direction) -> Option<String> {
        let rec = record(description, direction);
        let meta = MetadataExtractor::default().extract(description);
        rules.first_match(&rec, &meta).map(|r| r.name.clone())
    }

    fn taxonomy() -> Taxonomy {
        Taxonomy::embedded().unwrap()
    }

    #[test]
    fn test_embedded_rules_load() {
        let rules = RuleSet::embedded(&taxonomy()).unwrap();
        assert!(!rules.is_empty());
        assert!(rules
            .rules()
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.confidence)));
    }

    #[test]
    fn test_scenario_merchant_rule() {
        let rules = RuleSet::from_toml_str(
            r#"
            [[rule]]
            name = "johnstore"
            pattern = "JohnStore"
            category = "groceries"
            "#,
            &taxonomy(),
        )
        .unwrap();

        let rec = record("UPI/RRN123456789/JohnStore", Direction::Debit);
        let meta = MetadataExtractor::default().extract(&rec.description);
        let result = rules.first_match(&rec, &meta).unwrap().result();
        assert_eq!(result.category, "groceries");
        assert_eq!(result.subcategory, None);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.source, CategorySource::Rule);
    }

    #[test]
    fn test_first_match_wins() {
        let rules = RuleSet::embedded(&taxonomy()).unwrap();
        assert_eq!(
            categorize(&rules, "UPI/412345678901/UBER EATS/uber@axis", Direction::Debit).as_deref(),
            Some("food_delivery")
        );
        assert_eq!(
            categorize(&rules, "UPI/412345678901/UBER INDIA/uber@axis", Direction::Debit).as_deref(),
            Some("ride_hailing")
        );
    }

    #[test]
    fn test_direction_constraint() {
        let rules = RuleSet::embedded(&taxonomy()).unwrap();
        assert_eq!(
            categorize(&rules, "NEFT-ACME CORP-SALARY MAY", Direction::Credit).as_deref(),
            Some("salary_credit")
        );
        assert_ne!(
            categorize(&rules, "NEFT-ACME CORP-SALARY MAY", Direction::Debit).as_deref(),
            Some("salary_credit")
        );
    }

    #[test]
    fn test_channel_constraint() {
        let rules = RuleSet::embedded(&taxonomy()).unwrap();
        assert_eq!(
            categorize(&rules, "ATM WDL MG ROAD BANGALORE", Direction::Debit).as_deref(),
            Some("atm_withdrawal")
        );
    }

    #[test]
    fn test_mcc_field() {
        let rules = RuleSet::embedded(&taxonomy()).unwrap();
        assert_eq!(
            categorize(&rules, "POS 4111XXXXXXXX1234 LOCAL MART MCC 5411", Direction::Debit)
                .as_deref(),
            Some("mcc_grocery")
        );
    }

    #[test]
    fn test_pattern_types() {
        let contains = Matcher::compile("t", "SHELL|CHEVRON", PatternType::Contains).unwrap();
        assert!(contains.is_match("chevron 0042"));
        assert!(!contains.is_match("GROCERY STORE"));

        let exact = Matcher::compile("t", "Netflix", PatternType::Exact).unwrap();
        assert!(exact.is_match("NETFLIX"));
        assert!(!exact.is_match("NETFLIX.COM"));

        let regex = Matcher::compile("t", r"^NETFLIX.*", PatternType::Regex).unwrap();
        assert!(regex.is_match("netflix.com/bill"));
        assert!(!regex.is_match("HULU"));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let err = RuleSet::from_toml_str(
            r#"
            [[rule]]
            name = "bad"
            pattern = "X"
            category = "vacations"
            "#,
            &taxonomy(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = RuleSet::from_toml_str(
            r#"
            [[rule]]
            name = "bad"
            pattern = "(unclosed"
            pattern_type = "regex"
            category = "groceries"
            "#,
            &taxonomy(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("bad"));
    }
}
