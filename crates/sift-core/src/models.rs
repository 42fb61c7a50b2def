//! Domain models for Sift

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Category code assigned when nothing confident enough was found
pub const UNCATEGORIZED: &str = "uncategorized";

/// Money direction relative to the account holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    pub fn flip(&self) -> Self {
        match self {
            Self::Debit => Self::Credit,
            Self::Credit => Self::Debit,
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debit" | "dr" => Ok(Self::Debit),
            "credit" | "cr" => Ok(Self::Credit),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of cell text produced by a format extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based position of the row in the extracted statement
    pub row_number: usize,
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn new(row_number: usize, cells: Vec<String>) -> Self {
        Self { row_number, cells }
    }

    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(|s| s.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }

    pub fn joined(&self) -> String {
        self.cells.join(" ")
    }
}

/// A normalized statement row, one-to-one with its source row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransactionRecord {
    pub batch_id: String,
    pub row_number: usize,
    pub date: NaiveDate,
    /// Always a positive magnitude; see `direction`
    pub amount: Decimal,
    pub direction: Direction,
    pub description: String,
    /// Value of the profile's reference column, when it has one
    pub reference: Option<String>,
}

impl RawTransactionRecord {
    /// Amount with the direction applied (debits negative)
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Debit => -self.amount,
            Direction::Credit => self.amount,
        }
    }
}

/// Payment channel inferred from a description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Upi,
    Card,
    Neft,
    Imps,
    Rtgs,
    Atm,
    Cash,
    Cheque,
    Ach,
    NetBanking,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upi => "upi",
            Self::Card => "card",
            Self::Neft => "neft",
            Self::Imps => "imps",
            Self::Rtgs => "rtgs",
            Self::Atm => "atm",
            Self::Cash => "cash",
            Self::Cheque => "cheque",
            Self::Ach => "ach",
            Self::NetBanking => "net_banking",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upi" => Ok(Self::Upi),
            "card" | "pos" => Ok(Self::Card),
            "neft" => Ok(Self::Neft),
            "imps" => Ok(Self::Imps),
            "rtgs" => Ok(Self::Rtgs),
            "atm" => Ok(Self::Atm),
            "cash" => Ok(Self::Cash),
            "cheque" | "chq" => Ok(Self::Cheque),
            "ach" | "nach" | "ecs" => Ok(Self::Ach),
            "net_banking" | "netbanking" => Ok(Self::NetBanking),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata mined from a free-text description. Always recomputable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// Bank or payment-network reference (RRN/UTR)
    pub reference: Option<String>,
    /// Payment-network transaction id, when distinct from the reference
    pub network_txn_id: Option<String>,
    pub counterparty: Option<String>,
    /// Masked account number or UPI VPA of the counterparty
    pub account_hint: Option<String>,
    /// Merchant category code (4 digits)
    pub mcc: Option<String>,
    pub channel: Option<Channel>,
}

/// Where a categorization came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorySource {
    /// Matched a deterministic rule
    Rule,
    /// Produced (or defaulted) by the classifier
    Ml,
    /// Set by the user; permanent
    Override,
}

impl CategorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Ml => "ml",
            Self::Override => "override",
        }
    }
}

impl std::str::FromStr for CategorySource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rule" => Ok(Self::Rule),
            "ml" => Ok(Self::Ml),
            "override" => Ok(Self::Override),
            _ => Err(format!("Unknown category source: {}", s)),
        }
    }
}

impl std::fmt::Display for CategorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationResult {
    pub category: String,
    pub subcategory: Option<String>,
    /// In [0, 1]
    pub confidence: f64,
    pub source: CategorySource,
}

impl CategorizationResult {
    pub fn new(
        category: impl Into<String>,
        subcategory: Option<String>,
        confidence: f64,
        source: CategorySource,
    ) -> Self {
        Self {
            category: category.into(),
            subcategory,
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }

    /// Classifier default for low-confidence or unavailable predictions
    pub fn uncategorized(confidence: f64) -> Self {
        Self::new(UNCATEGORIZED, None, confidence, CategorySource::Ml)
    }

    pub fn is_uncategorized(&self) -> bool {
        self.category == UNCATEGORIZED
    }

    pub fn is_override(&self) -> bool {
        self.source == CategorySource::Override
    }
}

/// The unit emitted by the orchestrator and consumed by the goal rule engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTransaction {
    pub idempotency_key: String,
    pub user_id: String,
    pub record: RawTransactionRecord,
    pub metadata: TransactionMetadata,
    pub categorization: CategorizationResult,
    pub enriched_at: DateTime<Utc>,
}

impl EnrichedTransaction {
    pub fn signature(&self) -> TransactionSignature {
        TransactionSignature::new(&self.user_id, &self.record, &self.metadata)
    }

    pub fn is_debit(&self) -> bool {
        self.record.direction == Direction::Debit
    }
}

/// Upper bounds (exclusive) of amount buckets used to match equivalent transactions
const AMOUNT_BUCKET_BOUNDS: [i64; 12] = [
    10, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000,
];

/// Bucket index for an amount magnitude
pub fn amount_bucket(amount: Decimal) -> u8 {
    let magnitude = amount.abs();
    AMOUNT_BUCKET_BOUNDS
        .iter()
        .position(|bound| magnitude < Decimal::from(*bound))
        .unwrap_or(AMOUNT_BUCKET_BOUNDS.len()) as u8
}

/// Lowercase, alphanumerics only, single spaces
pub fn normalize_key_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identifies "the same kind of transaction" for override lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub user_id: String,
    /// Normalized counterparty, or normalized description when no counterparty was found
    pub counterparty_key: String,
    pub direction: Direction,
    pub amount_bucket: u8,
}

impl TransactionSignature {
    pub fn new(
        user_id: &str,
        record: &RawTransactionRecord,
        metadata: &TransactionMetadata,
    ) -> Self {
        let counterparty_key = metadata
            .counterparty
            .as_deref()
            .map(normalize_key_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| normalize_key_text(&record.description));
        Self {
            user_id: user_id.to_string(),
            counterparty_key,
            direction: record.direction,
            amount_bucket: amount_bucket(record.amount),
        }
    }

    /// Storage key (user id is kept in its own column)
    pub fn key(&self) -> String {
        format!(
            "{}|{}|b{}",
            self.counterparty_key,
            self.direction.as_str(),
            self.amount_bucket
        )
    }
}

/// A user-supplied categorization for a transaction signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Override {
    pub id: i64,
    pub user_id: String,
    pub signature: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Why a statement row was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    RowParseError,
    AmbiguousDateFormat,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RowParseError => "row_parse_error",
            Self::AmbiguousDateFormat => "ambiguous_date_format",
        }
    }
}

impl std::str::FromStr for SkipReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "row_parse_error" => Ok(Self::RowParseError),
            "ambiguous_date_format" => Ok(Self::AmbiguousDateFormat),
            _ => Err(format!("Unknown skip reason: {}", s)),
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub row_number: usize,
    pub reason: SkipReason,
    pub detail: String,
}

/// Rows categorized per source during one enrichment run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizationBreakdown {
    pub by_rule: usize,
    pub by_ml: usize,
    pub by_override: usize,
    /// Subset of `by_ml` that ended up `uncategorized`
    pub uncategorized: usize,
}

impl CategorizationBreakdown {
    pub fn record(&mut self, result: &CategorizationResult) {
        match result.source {
            CategorySource::Rule => self.by_rule += 1,
            CategorySource::Ml => self.by_ml += 1,
            CategorySource::Override => self.by_override += 1,
        }
        if result.is_uncategorized() {
            self.uncategorized += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.by_rule + self.by_ml + self.by_override
    }
}

/// What the compare-and-set upsert did with a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Key was unseen; row stored
    Inserted,
    /// Key existed; rule/ml categorization replaced
    Recategorized,
    /// Key existed with the same categorization
    Unchanged,
    /// Key existed with an override; categorization left alone
    OverrideKept,
}

/// Per-batch counts and diagnostics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub batch_id: String,
    pub user_id: String,
    pub bank_code: String,
    pub format: Option<String>,
    pub rows_total: usize,
    pub rows_parsed: usize,
    pub rows_skipped: usize,
    pub skipped: Vec<SkippedRow>,
    pub rows_categorized_by_source: CategorizationBreakdown,
    pub inserted: usize,
    pub recategorized: usize,
    pub unchanged: usize,
    pub override_kept: usize,
    pub signals_emitted: usize,
    pub rule_failures: usize,
    pub created_at: Option<DateTime<Utc>>,
}

impl IngestionSummary {
    pub fn skipped_with(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }

    pub fn record_upsert(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Recategorized => self.recategorized += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
            UpsertOutcome::OverrideKept => self.override_kept += 1,
        }
    }
}

/// Filters for reading enriched transactions back
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub user_id: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub category: Option<String>,
    pub source: Option<CategorySource>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TransactionQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Goals
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    /// Accumulate `target_amount` by `target_date`
    Savings,
    /// Keep monthly debits in `category` under `target_amount`
    SpendingCap,
}

impl GoalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Savings => "savings",
            Self::SpendingCap => "spending_cap",
        }
    }
}

impl std::str::FromStr for GoalKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "savings" => Ok(Self::Savings),
            "spending_cap" | "cap" | "budget" => Ok(Self::SpendingCap),
            _ => Err(format!("Unknown goal kind: {}", s)),
        }
    }
}

impl std::fmt::Display for GoalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Achieved,
    Paused,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Achieved => "achieved",
            Self::Paused => "paused",
        }
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "achieved" => Ok(Self::Achieved),
            "paused" => Ok(Self::Paused),
            _ => Err(format!("Unknown goal status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub kind: GoalKind,
    pub target_amount: Decimal,
    pub current_amount: Decimal,
    /// Spending caps only
    pub category: Option<String>,
    pub start_date: NaiveDate,
    pub target_date: Option<NaiveDate>,
    /// Share of each income credit moved into this goal automatically (savings only)
    pub auto_allocate_ratio: Option<Decimal>,
    pub status: GoalStatus,
}

impl Goal {
    pub fn is_active(&self) -> bool {
        self.status == GoalStatus::Active
    }

    pub fn remaining(&self) -> Decimal {
        (self.target_amount - self.current_amount).max(Decimal::ZERO)
    }
}

#[derive(Debug, Clone)]
pub struct NewGoal {
    pub user_id: String,
    pub name: String,
    pub kind: GoalKind,
    pub target_amount: Decimal,
    pub category: Option<String>,
    pub start_date: NaiveDate,
    pub target_date: Option<NaiveDate>,
    pub auto_allocate_ratio: Option<Decimal>,
}

/// Goal state read at one instant
#[derive(Debug, Clone, Default)]
pub struct GoalStateSnapshot {
    pub goals: Vec<Goal>,
}

impl GoalStateSnapshot {
    pub fn active(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter().filter(|g| g.is_active())
    }

    pub fn savings_goals(&self) -> impl Iterator<Item = &Goal> {
        self.active().filter(|g| g.kind == GoalKind::Savings)
    }

    pub fn caps_for<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Goal> + 'a {
        self.active().filter(move |g| {
            g.kind == GoalKind::SpendingCap && g.category.as_deref() == Some(category)
        })
    }
}

// =============================================================================
// Signals
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// An observation
    Signal,
    /// A recommended action the user can accept or dismiss
    Suggestion,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::Suggestion => "suggestion",
        }
    }
}

impl std::str::FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "signal" => Ok(Self::Signal),
            "suggestion" => Ok(Self::Suggestion),
            _ => Err(format!("Unknown signal kind: {}", s)),
        }
    }
}

/// Severity level of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational - no action needed
    Info,
    /// Worth attention but not urgent
    Attention,
    /// Should be addressed soon
    Warning,
    /// Requires immediate attention
    Alert,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Attention => "attention",
            Severity::Warning => "warning",
            Severity::Alert => "alert",
        }
    }

    /// Numeric priority for sorting (higher = more urgent)
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Info => 1,
            Severity::Attention => 2,
            Severity::Warning => 3,
            Severity::Alert => 4,
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "attention" => Ok(Severity::Attention),
            "warning" => Ok(Severity::Warning),
            "alert" => Ok(Severity::Alert),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Active,
    Accepted,
    Dismissed,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Accepted => "accepted",
            Self::Dismissed => "dismissed",
        }
    }
}

impl std::str::FromStr for SignalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "accepted" => Ok(Self::Accepted),
            "dismissed" => Ok(Self::Dismissed),
            _ => Err(format!("Unknown signal status: {}", s)),
        }
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A signal as produced by a rule, before persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSignal {
    pub user_id: String,
    pub rule: String,
    pub kind: SignalKind,
    /// Rule-specific type code, e.g. "goal_drift"
    pub signal_type: String,
    pub severity: Severity,
    pub message: String,
    pub payload: serde_json::Value,
    /// Replaying the same transaction yields the same key, so signals never duplicate
    pub dedup_key: String,
    pub transaction_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub user_id: String,
    pub rule: String,
    pub kind: SignalKind,
    pub signal_type: String,
    pub severity: Severity,
    pub message: String,
    pub payload: serde_json::Value,
    pub dedup_key: String,
    pub transaction_key: Option<String>,
    pub status: SignalStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn record(description: &str, amount: &str, direction: Direction) -> RawTransactionRecord {
        RawTransactionRecord {
            batch_id: "b1".into(),
            row_number: 1,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            amount: Decimal::from_str(amount).unwrap(),
            direction,
            description: description.into(),
            reference: None,
        }
    }

    #[test]
    fn test_amount_bucket_boundaries() {
        assert_eq!(amount_bucket(Decimal::from_str("9.99").unwrap()), 0);
        assert_eq!(amount_bucket(Decimal::from(10)), 1);
        assert_eq!(amount_bucket(Decimal::from_str("450.00").unwrap()), 4);
        assert_eq!(amount_bucket(Decimal::from_str("-450.00").unwrap()), 4);
        assert_eq!(amount_bucket(Decimal::from(250_000)), 12);
    }

    #[test]
    fn test_signature_prefers_counterparty() {
        let rec = record("UPI/RRN123456789/JohnStore", "450.00", Direction::Debit);
        let meta = TransactionMetadata {
            counterparty: Some("John  Store".into()),
            ..Default::default()
        };
        let sig = TransactionSignature::new("u1", &rec, &meta);
        assert_eq!(sig.counterparty_key, "john store");
        assert_eq!(sig.key(), "john store|debit|b4");
    }

    #[test]
    fn test_signature_falls_back_to_description() {
        let rec = record("ATM CASH WDL", "2000", Direction::Debit);
        let sig = TransactionSignature::new("u1", &rec, &TransactionMetadata::default());
        assert_eq!(sig.counterparty_key, "atm cash wdl");
    }

    #[test]
    fn test_breakdown_counts_uncategorized_under_ml() {
        let mut breakdown = CategorizationBreakdown::default();
        breakdown.record(&CategorizationResult::uncategorized(0.2));
        breakdown.record(&CategorizationResult::new(
            "groceries",
            None,
            0.9,
            CategorySource::Rule,
        ));
        assert_eq!(breakdown.by_ml, 1);
        assert_eq!(breakdown.by_rule, 1);
        assert_eq!(breakdown.uncategorized, 1);
        assert_eq!(breakdown.total(), 2);
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!(Direction::from_str("DR").unwrap(), Direction::Debit);
        assert_eq!(Direction::from_str("credit").unwrap(), Direction::Credit);
        assert!(Direction::from_str("sideways").is_err());
    }
}
