//! Description metadata extraction
//!
//! Pattern-based mining of bank description strings. Every matcher is
//! optional: finding nothing leaves the field empty, and the stage never fails.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::MetadataConfig;
use crate::error::Result;
use crate::models::{Channel, TransactionMetadata};

/// Minimum digits a token needs to count as a reference number
const REFERENCE_MIN_DIGITS: usize = 6;

fn network_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[^A-Za-z0-9])(?:UTR|TXN\s*ID|TXNID)(?:\s*NO\.?)?[\s:#/-]*([A-Za-z0-9]{6,30})")
            .expect("network id regex")
    })
}

fn masked_account_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[^A-Za-z0-9*])((?:X{2,}|\*{2,})\d{3,6})(?:[^A-Za-z0-9]|$)")
            .expect("masked account regex")
    })
}

fn vpa_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9][A-Za-z0-9._]{1,}@[A-Za-z][A-Za-z0-9]{1,})")
            .expect("vpa regex")
    })
}

fn mcc_labeled_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bMCC[\s:#-]*(\d{4})\b").expect("mcc regex"))
}

fn mcc_segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[/|*])(\d{4})(?:[/|*]|$)").expect("mcc segment regex"))
}

fn channel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(UPI|POS|NEFT|IMPS|RTGS|ATM|NACH|ACH|ECS|CHQ|CHEQUE|CLG|CASH|VISA|MASTERCARD|RUPAY|AMEX|CARD|NETBANKING|NET BANKING|INB)\b",
        )
        .expect("channel regex")
    })
}

fn ifsc_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{4}0[A-Z0-9]{6}$").expect("ifsc regex"))
}

fn segment_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[/|*:]").expect("segment regex"))
}

/// Words that describe how money moved rather than who it moved to
const BOILERPLATE: &[&str] = &[
    "UPI", "IMPS", "NEFT", "RTGS", "POS", "ATM", "NACH", "ACH", "ECS", "CHQ", "CHEQUE", "CLG",
    "CASH", "VISA", "MASTERCARD", "RUPAY", "AMEX", "CARD", "DEBIT", "CREDIT", "P2M", "P2A", "CR",
    "DR", "TRF", "TRANSFER", "TO", "BY", "FROM", "REF", "RRN", "UTR", "TXN", "ID", "NO", "MCC",
    "WDL", "WD", "WITHDRAWAL", "DEP", "DEPOSIT", "INB", "NETBANKING", "MMT", "PMT", "PAYMENT",
    "PURCHASE", "A", "C", "AC", "INR", "RS", "HDFC", "ICIC", "ICICI", "SBIN", "SBI", "UTIB",
    "AXIS", "KKBK", "KOTAK", "YESB", "PUNB", "BARB",
];

fn boilerplate() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| BOILERPLATE.iter().copied().collect())
}

/// Ordered matchers over free-text descriptions
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    /// One pattern per configured prefix, tried in order
    reference_patterns: Vec<Regex>,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::from_config(&MetadataConfig::default())
            .unwrap_or_else(|_| Self { reference_patterns: Vec::new() })
    }
}

impl MetadataExtractor {
    pub fn from_config(config: &MetadataConfig) -> Result<Self> {
        let reference_patterns = config
            .reference_prefixes
            .iter()
            .map(|prefix| {
                Regex::new(&format!(
                    r"(?i)(?:^|[^A-Za-z0-9]){}(?:[A-Za-z0-9]{{2,4}}/)?[\s:.#-]*(?:NO\.?\s*)?([A-Za-z0-9]{{8,22}})(?:[^A-Za-z0-9]|$)",
                    regex::escape(prefix.trim())
                ))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { reference_patterns })
    }

    pub fn extract(&self, description: &str) -> TransactionMetadata {
        let reference = self.reference(description);
        let network_txn_id = network_txn_id(description).filter(|id| Some(id) != reference.as_ref());
        let account_hint = account_hint(description);
        let mcc = merchant_category_code(description);
        let channel = channel(description);

        let counterparty = counterparty(
            description,
            &[reference.as_deref(), network_txn_id.as_deref(), mcc.as_deref()],
        );

        TransactionMetadata {
            reference,
            network_txn_id,
            counterparty,
            account_hint,
            mcc,
            channel,
        }
    }

    fn reference(&self, description: &str) -> Option<String> {
        self.reference_patterns.iter().find_map(|re| {
            re.captures_iter(description)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str())
                .find(|token| digit_count(token) >= REFERENCE_MIN_DIGITS)
                .map(str::to_string)
        })
    }
}

fn digit_count(s: &str) -> usize {
    s.chars().filter(|c| c.is_ascii_digit()).count()
}

fn network_txn_id(description: &str) -> Option<String> {
    network_id_re()
        .captures_iter(description)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|token| digit_count(token) >= REFERENCE_MIN_DIGITS)
        .map(str::to_string)
}

fn account_hint(description: &str) -> Option<String> {
    masked_account_re()
        .captures(description)
        .and_then(|caps| caps.get(1))
        .or_else(|| vpa_re().captures(description).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str().to_string())
}

fn merchant_category_code(description: &str) -> Option<String> {
    mcc_labeled_re()
        .captures(description)
        .or_else(|| mcc_segment_re().captures(description))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn channel(description: &str) -> Option<Channel> {
    let keyword = channel_re().find(description)?.as_str().to_ascii_uppercase();
    let channel = match keyword.as_str() {
        "UPI" => Channel::Upi,
        "NEFT" => Channel::Neft,
        "IMPS" => Channel::Imps,
        "RTGS" => Channel::Rtgs,
        "ATM" => Channel::Atm,
        "NACH" | "ACH" | "ECS" => Channel::Ach,
        "CHQ" | "CHEQUE" | "CLG" => Channel::Cheque,
        "CASH" => Channel::Cash,
        "NETBANKING" | "NET BANKING" | "INB" => Channel::NetBanking,
        _ => Channel::Card,
    };
    Some(channel)
}

/// What remains of the first description segment that names someone
fn counterparty(description: &str, known_ids: &[Option<&str>]) -> Option<String> {
    let is_noise = |word: &str| -> bool {
        let upper = word.to_ascii_uppercase();
        let stripped = upper.trim_matches(|c: char| !c.is_alphanumeric());
        stripped.is_empty()
            || boilerplate().contains(stripped)
            || word.contains('@')
            || ifsc_re().is_match(stripped)
            || masked_account_re().is_match(word)
            || digit_count(word) >= REFERENCE_MIN_DIGITS
            || word
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '(' | ')'))
            || known_ids
                .iter()
                .flatten()
                .any(|id| id.eq_ignore_ascii_case(stripped))
    };

    segment_split_re()
        .split(description)
        .map(|segment| {
            let mut words: Vec<&str> = Vec::new();
            for word in segment.split_whitespace() {
                // "UPI-SWIGGY" or "CR-ACME": break hyphens only around boilerplate
                let parts: Vec<&str> = word.split('-').filter(|p| !p.is_empty()).collect();
                let hyphen_noise = parts.len() > 1 && parts.iter().any(|p| is_noise(p));
                let pieces = if hyphen_noise { parts } else { vec![word] };
                for piece in pieces {
                    if is_noise(piece) {
                        continue;
                    }
                    if words
                        .last()
                        .is_some_and(|last| last.eq_ignore_ascii_case(piece))
                    {
                        continue;
                    }
                    words.push(piece);
                }
            }
            words.join(" ")
        })
        .find(|name| !name.is_empty())
}
