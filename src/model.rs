use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::FinError;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// Icon keys the frontend ships artwork for. Anything else renders as `Other`.
pub const ICON_KEYS: [&str; 10] = [
    "Food",
    "Shopping",
    "Transportation",
    "Entertainment",
    "Salary",
    "Utilities",
    "Healthcare",
    "Freelance",
    "Investment",
    "Other",
];

pub const DEFAULT_ICON: &str = "Other";

/// Whether money comes in or goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Income,
    Expense,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Income => "income",
            Kind::Expense => "expense",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = FinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(Kind::Income),
            "expense" => Ok(Kind::Expense),
            other => Err(FinError::validation(format!(
                "Unknown transaction type \"{}\", expected income or expense.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(default = "default_icon")]
    pub icon_key: String,
    #[serde(default)]
    pub is_default: bool,
}

impl Category {
    fn builtin(name: &str, kind: Kind) -> Self {
        Category {
            name: name.to_string(),
            kind,
            icon_key: name.to_string(),
            is_default: true,
        }
    }

    /// Categories are identified by name (ignoring case) within a kind.
    pub fn same_identity(&self, name: &str, kind: Kind) -> bool {
        self.kind == kind && self.name.to_lowercase() == name.to_lowercase()
    }
}

/// Identity of a category without its display fields, as carried by deletions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Kind,
}

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: Kind,
    pub category: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub target_amount: f64,
    pub current_amount: f64,
    #[serde(default, deserialize_with = "optional_date")]
    pub target_date: Option<NaiveDate>,
}

/// Category name to monthly limit.
pub type Budgets = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub email: String,
    /// Base64 data URL, stored verbatim.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Everything a user tracks, minus the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub categories: Vec<Category>,
    pub transactions: Vec<Transaction>,
    pub budgets: Budgets,
    pub goals: Vec<Goal>,
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger {
            categories: default_categories(),
            transactions: Vec::new(),
            budgets: default_budgets(),
            goals: Vec::new(),
        }
    }
}

/// The full picture exchanged by the sync endpoint and kept in the client cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub profile: Profile,
    #[serde(flatten)]
    pub ledger: Ledger,
}

impl Snapshot {
    pub fn new(name: &str, email: &str) -> Self {
        Snapshot {
            profile: Profile {
                name: name.to_string(),
                email: email.to_string(),
                avatar: None,
            },
            ledger: Ledger::default(),
        }
    }
}

pub fn default_categories() -> Vec<Category> {
    let expense = [
        "Food",
        "Shopping",
        "Transportation",
        "Entertainment",
        "Utilities",
        "Healthcare",
        "Other",
    ];
    let income = ["Salary", "Freelance", "Investment", "Other"];

    expense
        .iter()
        .map(|name| Category::builtin(name, Kind::Expense))
        .chain(income.iter().map(|name| Category::builtin(name, Kind::Income)))
        .collect()
}

pub fn default_budgets() -> Budgets {
    [
        ("Food", 2_000_000.0),
        ("Shopping", 1_000_000.0),
        ("Transportation", 500_000.0),
        ("Entertainment", 750_000.0),
        ("Utilities", 800_000.0),
        ("Healthcare", 300_000.0),
        ("Other", 500_000.0),
    ]
    .iter()
    .map(|(name, amount)| (name.to_string(), *amount))
    .collect()
}

/// Fresh client-side record id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// CSS class used to colour a category icon.
pub fn icon_class(icon_key: &str) -> String {
    let key: String = icon_key.split_whitespace().collect();
    if ICON_KEYS.contains(&key.as_str()) {
        format!("category-icon-{}", key)
    } else {
        format!("category-icon-{}", DEFAULT_ICON)
    }
}

/// Parse an amount typed with Indonesian grouping, e.g. `1.500.000` or `2.500,5`.
pub fn parse_amount(input: &str) -> Option<f64> {
    let cleaned: String = input
        .trim()
        .trim_start_matches("Rp")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => None,
    }
}

/// Rupiah with no decimals and `.` as thousands separator.
pub fn format_idr(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if rounded < 0 {
        format!("-Rp {}", grouped)
    } else {
        format!("Rp {}", grouped)
    }
}

// Accepts a missing value, null, "" or a YYYY-MM-DD string.
fn optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// [`present`] for dates, with `""` read like `null`.
pub(crate) fn present_date<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_date(deserializer).map(Some)
}

/// Keeps an explicit `null` apart from a missing key: `Some(None)` vs `None`.
pub(crate) fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
