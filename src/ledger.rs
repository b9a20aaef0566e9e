//! CRUD operations over a single user's [`Ledger`].
//!
//! The same code runs on the server (REST handlers) and in the offline client
//! cache, so both sides validate input identically.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{FinError, Result};
use crate::model::{
    Category, DEFAULT_ICON, Goal, Kind, Ledger, Profile, Transaction, is_valid_email, new_id,
};

/// Fields a user fills in when recording or editing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: Kind,
    pub category: String,
    pub date: NaiveDate,
}

impl TransactionInput {
    pub(crate) fn validate(&self) -> Result<()> {
        check_transaction(self.amount, &self.category)
    }

    pub(crate) fn into_transaction(self, id: String) -> Transaction {
        Transaction {
            id,
            description: self.description.trim().to_string(),
            amount: self.amount,
            kind: self.kind,
            category: self.category.trim().to_string(),
            date: self.date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalInput {
    pub name: String,
    pub target_amount: f64,
    #[serde(default)]
    pub current_amount: f64,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
}

impl GoalInput {
    fn validate(&self) -> Result<()> {
        check_goal(&self.name, self.target_amount, self.current_amount)
    }

    fn into_goal(self, id: String) -> Goal {
        Goal {
            id,
            name: self.name.trim().to_string(),
            target_amount: self.target_amount,
            current_amount: self.current_amount,
            target_date: self.target_date,
        }
    }
}

/// Fields to change on an existing transaction. Absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl TransactionPatch {
    fn apply(self, tx: &mut Transaction) {
        if let Some(description) = self.description {
            tx.description = description.trim().to_string();
        }
        if let Some(amount) = self.amount {
            tx.amount = amount;
        }
        if let Some(kind) = self.kind {
            tx.kind = kind;
        }
        if let Some(category) = self.category {
            tx.category = category.trim().to_string();
        }
        if let Some(date) = self.date {
            tx.date = date;
        }
    }
}

impl From<TransactionInput> for TransactionPatch {
    fn from(input: TransactionInput) -> Self {
        TransactionPatch {
            description: Some(input.description),
            amount: Some(input.amount),
            kind: Some(input.kind),
            category: Some(input.category),
            date: Some(input.date),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_amount: Option<f64>,
    /// `Some(None)` (JSON `null` or `""`) removes the deadline.
    #[serde(default, deserialize_with = "crate::model::present_date", skip_serializing_if = "Option::is_none")]
    pub target_date: Option<Option<NaiveDate>>,
}

impl GoalPatch {
    fn apply(self, goal: &mut Goal) {
        if let Some(name) = self.name {
            goal.name = name.trim().to_string();
        }
        if let Some(target) = self.target_amount {
            goal.target_amount = target;
        }
        if let Some(current) = self.current_amount {
            goal.current_amount = current;
        }
        if let Some(date) = self.target_date {
            goal.target_date = date;
        }
    }
}

impl From<GoalInput> for GoalPatch {
    fn from(input: GoalInput) -> Self {
        GoalPatch {
            name: Some(input.name),
            target_amount: Some(input.target_amount),
            current_amount: Some(input.current_amount),
            target_date: Some(input.target_date),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(default)]
    pub icon_key: Option<String>,
}

fn check_transaction(amount: f64, category: &str) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(FinError::validation(
            "Invalid amount. Please enter a valid positive number.",
        ));
    }
    if category.trim().is_empty() {
        return Err(FinError::validation("Category is required."));
    }
    Ok(())
}

fn check_goal(name: &str, target_amount: f64, current_amount: f64) -> Result<()> {
    if name.trim().is_empty() {
        return Err(FinError::validation("Goal name cannot be empty."));
    }
    if !target_amount.is_finite() || target_amount <= 0.0 {
        return Err(FinError::validation("Target amount must be a positive number."));
    }
    if !current_amount.is_finite() || current_amount < 0.0 {
        return Err(FinError::validation(
            "Current amount must be a non-negative number.",
        ));
    }
    Ok(())
}

pub(crate) fn check_budget(category: &str, amount: f64) -> Result<()> {
    if category.trim().is_empty() {
        return Err(FinError::validation("Category not selected or identified."));
    }
    if !amount.is_finite() || amount < 0.0 {
        return Err(FinError::validation(
            "Please enter a valid, non-negative amount for the budget.",
        ));
    }
    Ok(())
}

/// Validate a profile edit; returns the normalised name and email.
pub fn check_profile(name: &str, email: &str) -> Result<(String, String)> {
    let name = name.trim();
    let email = email.trim();
    if name.is_empty() || email.is_empty() {
        return Err(FinError::validation("Name and Email cannot be empty."));
    }
    if !is_valid_email(email) {
        return Err(FinError::validation("Please enter a valid email address."));
    }
    Ok((name.to_string(), email.to_string()))
}

pub fn apply_profile(profile: &mut Profile, name: &str, email: &str, avatar: Option<Option<String>>) -> Result<()> {
    let (name, email) = check_profile(name, email)?;
    profile.name = name;
    profile.email = email;
    if let Some(avatar) = avatar {
        profile.avatar = avatar;
    }
    Ok(())
}

impl Ledger {
    // Transactions

    pub fn transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.id == id)
    }

    pub fn add_transaction(&mut self, input: TransactionInput) -> Result<Transaction> {
        input.validate()?;
        let tx = input.into_transaction(new_id());
        self.transactions.push(tx.clone());
        Ok(tx)
    }

    /// Merge `patch` into the stored record. The id never changes.
    pub fn update_transaction(&mut self, id: &str, patch: TransactionPatch) -> Result<Transaction> {
        let slot = self
            .transactions
            .iter_mut()
            .find(|tx| tx.id == id)
            .ok_or_else(|| FinError::not_found(format!("Transaction {} not found.", id)))?;
        let mut updated = slot.clone();
        patch.apply(&mut updated);
        check_transaction(updated.amount, &updated.category)?;
        *slot = updated.clone();
        Ok(updated)
    }

    pub fn delete_transaction(&mut self, id: &str) -> Result<()> {
        let before = self.transactions.len();
        self.transactions.retain(|tx| tx.id != id);
        if self.transactions.len() == before {
            return Err(FinError::not_found(format!("Transaction {} not found.", id)));
        }
        Ok(())
    }

    /// Insert or replace by id. Used by sync and import, where ids come from the client.
    pub fn upsert_transaction(&mut self, tx: Transaction) -> Result<()> {
        if tx.id.trim().is_empty() {
            return Err(FinError::validation("Transaction id is required."));
        }
        check_transaction(tx.amount, &tx.category)?;
        match self.transactions.iter_mut().find(|t| t.id == tx.id) {
            Some(existing) => *existing = tx,
            None => self.transactions.push(tx),
        }
        Ok(())
    }

    // Categories

    pub fn category(&self, name: &str, kind: Kind) -> Option<&Category> {
        self.categories.iter().find(|c| c.same_identity(name, kind))
    }

    pub fn add_category(&mut self, input: CategoryInput) -> Result<Category> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(FinError::validation("Category name cannot be empty."));
        }
        if self.category(name, input.kind).is_some() {
            return Err(FinError::Conflict(format!(
                "Category \"{}\" already exists for {}.",
                name, input.kind
            )));
        }
        let category = Category {
            name: name.to_string(),
            kind: input.kind,
            icon_key: input
                .icon_key
                .filter(|key| !key.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ICON.to_string()),
            is_default: false,
        };
        self.categories.push(category.clone());
        Ok(category)
    }

    /// Remove a custom category. Defaults are permanent.
    pub fn delete_category(&mut self, name: &str, kind: Kind) -> Result<()> {
        let index = self
            .categories
            .iter()
            .position(|c| c.same_identity(name, kind))
            .ok_or_else(|| FinError::not_found(format!("Category \"{}\" ({}) not found.", name, kind)))?;
        if self.categories[index].is_default {
            return Err(FinError::validation("Cannot delete default categories."));
        }
        self.categories.remove(index);
        Ok(())
    }

    pub fn expense_categories_for_budgeting(&self) -> Vec<String> {
        self.categories
            .iter()
            .filter(|c| c.kind == Kind::Expense)
            .map(|c| c.name.clone())
            .collect()
    }

    // Budgets

    pub fn set_budget(&mut self, category: &str, amount: f64) -> Result<()> {
        let category = category.trim();
        check_budget(category, amount)?;
        self.budgets.insert(category.to_string(), amount);
        Ok(())
    }

    pub fn delete_budget(&mut self, category: &str) -> Result<()> {
        self.budgets
            .remove(category)
            .map(|_| ())
            .ok_or_else(|| FinError::not_found(format!("No budget set for \"{}\".", category)))
    }

    // Goals

    pub fn goal(&self, id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    pub fn add_goal(&mut self, input: GoalInput) -> Result<Goal> {
        input.validate()?;
        let goal = input.into_goal(new_id());
        self.goals.push(goal.clone());
        Ok(goal)
    }

    pub fn update_goal(&mut self, id: &str, patch: GoalPatch) -> Result<Goal> {
        let slot = self
            .goals
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| FinError::not_found(format!("Goal {} not found.", id)))?;
        let mut updated = slot.clone();
        patch.apply(&mut updated);
        check_goal(&updated.name, updated.target_amount, updated.current_amount)?;
        *slot = updated.clone();
        Ok(updated)
    }

    pub fn delete_goal(&mut self, id: &str) -> Result<()> {
        let before = self.goals.len();
        self.goals.retain(|g| g.id != id);
        if self.goals.len() == before {
            return Err(FinError::not_found(format!("Goal {} not found.", id)));
        }
        Ok(())
    }

    pub fn upsert_goal(&mut self, goal: Goal) -> Result<()> {
        if goal.id.trim().is_empty() {
            return Err(FinError::validation("Goal id is required."));
        }
        check_goal(&goal.name, goal.target_amount, goal.current_amount)?;
        match self.goals.iter_mut().find(|g| g.id == goal.id) {
            Some(existing) => *existing = goal,
            None => self.goals.push(goal),
        }
        Ok(())
    }

    /// Check every stored record against the rules applied on entry. Used
    /// before adopting a ledger that did not come through the CRUD calls.
    pub fn validate(&self) -> Result<()> {
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(FinError::validation("Category name cannot be empty."));
            }
        }
        for tx in &self.transactions {
            if tx.id.trim().is_empty() {
                return Err(FinError::validation("Transaction id is required."));
            }
            check_transaction(tx.amount, &tx.category)?;
        }
        for (category, amount) in &self.budgets {
            check_budget(category, *amount)?;
        }
        for goal in &self.goals {
            if goal.id.trim().is_empty() {
                return Err(FinError::validation("Goal id is required."));
            }
            check_goal(&goal.name, goal.target_amount, goal.current_amount)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lunch() -> TransactionInput {
        TransactionInput {
            description: "Lunch".into(),
            amount: 45_000.0,
            kind: Kind::Expense,
            category: "Food".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 3).unwrap(),
        }
    }

    #[test]
    fn transactions_round_trip_through_crud() {
        let mut ledger = Ledger::default();
        let tx = ledger.add_transaction(lunch()).unwrap();
        assert_eq!(ledger.transactions.len(), 1);

        let mut edit = lunch();
        edit.amount = 50_000.0;
        let updated = ledger.update_transaction(&tx.id, edit.into()).unwrap();
        assert_eq!(updated.id, tx.id);
        assert_eq!(ledger.transaction(&tx.id).unwrap().amount, 50_000.0);

        ledger.delete_transaction(&tx.id).unwrap();
        assert!(ledger.transactions.is_empty());
        assert!(matches!(ledger.delete_transaction(&tx.id), Err(FinError::NotFound(_))));
    }

    #[test]
    fn updates_merge_only_the_given_fields() {
        let mut ledger = Ledger::default();
        let tx = ledger.add_transaction(lunch()).unwrap();

        let patch: TransactionPatch = serde_json::from_str(r#"{"amount": 5}"#).unwrap();
        let updated = ledger.update_transaction(&tx.id, patch).unwrap();
        assert_eq!(updated.amount, 5.0);
        assert_eq!(updated.description, "Lunch");
        assert_eq!(updated.category, "Food");
        assert_eq!(updated.date, tx.date);

        let blank = TransactionPatch { category: Some("  ".into()), ..TransactionPatch::default() };
        assert!(matches!(ledger.update_transaction(&tx.id, blank), Err(FinError::Validation(_))));
        assert_eq!(ledger.transaction(&tx.id).unwrap().category, "Food");
    }

    #[test]
    fn goal_patches_keep_unset_fields_and_can_clear_the_date() {
        let mut ledger = Ledger::default();
        let goal = ledger
            .add_goal(GoalInput {
                name: "Bike".into(),
                target_amount: 3_000_000.0,
                current_amount: 0.0,
                target_date: NaiveDate::from_ymd_opt(2026, 12, 1),
            })
            .unwrap();

        let saved: GoalPatch = serde_json::from_str(r#"{"currentAmount": 500000}"#).unwrap();
        let updated = ledger.update_goal(&goal.id, saved).unwrap();
        assert_eq!(updated.current_amount, 500_000.0);
        assert_eq!(updated.target_date, goal.target_date);

        let cleared: GoalPatch = serde_json::from_str(r#"{"targetDate": null}"#).unwrap();
        assert_eq!(ledger.update_goal(&goal.id, cleared).unwrap().target_date, None);

        let zero = GoalPatch { target_amount: Some(0.0), ..GoalPatch::default() };
        assert!(ledger.update_goal(&goal.id, zero).is_err());
        assert!(matches!(
            ledger.update_goal("missing", GoalPatch::default()),
            Err(FinError::NotFound(_))
        ));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let mut ledger = Ledger::default();
        let mut bad = lunch();
        bad.amount = 0.0;
        assert!(matches!(ledger.add_transaction(bad), Err(FinError::Validation(_))));
        let mut bad = lunch();
        bad.amount = f64::NAN;
        assert!(ledger.add_transaction(bad).is_err());
    }

    #[test]
    fn duplicate_categories_ignore_case_but_not_kind() {
        let mut ledger = Ledger::default();
        let dup = CategoryInput { name: "food".into(), kind: Kind::Expense, icon_key: None };
        assert!(matches!(ledger.add_category(dup), Err(FinError::Conflict(_))));

        let pets = CategoryInput { name: "Pets".into(), kind: Kind::Expense, icon_key: None };
        let created = ledger.add_category(pets).unwrap();
        assert_eq!(created.icon_key, "Other");
        assert!(!created.is_default);

        let food_income = CategoryInput { name: "Food".into(), kind: Kind::Income, icon_key: None };
        assert!(ledger.add_category(food_income).is_ok());
    }

    #[test]
    fn default_categories_cannot_be_deleted() {
        let mut ledger = Ledger::default();
        assert!(matches!(
            ledger.delete_category("Food", Kind::Expense),
            Err(FinError::Validation(_))
        ));
        ledger
            .add_category(CategoryInput { name: "Pets".into(), kind: Kind::Expense, icon_key: None })
            .unwrap();
        assert!(matches!(
            ledger.delete_category("Pets", Kind::Income),
            Err(FinError::NotFound(_))
        ));
        ledger.delete_category("pets", Kind::Expense).unwrap();
        assert!(ledger.category("Pets", Kind::Expense).is_none());
        assert!(matches!(
            ledger.delete_category("Pets", Kind::Expense),
            Err(FinError::NotFound(_))
        ));
    }

    #[test]
    fn budgets_overwrite_and_delete() {
        let mut ledger = Ledger::default();
        ledger.set_budget("Food", 2_500_000.0).unwrap();
        assert_eq!(ledger.budgets["Food"], 2_500_000.0);
        ledger.set_budget("Gym", 0.0).unwrap();
        assert!(ledger.set_budget("Gym", -1.0).is_err());
        ledger.delete_budget("Gym").unwrap();
        assert!(ledger.delete_budget("Gym").is_err());
    }

    #[test]
    fn goals_validate_and_allow_overshoot() {
        let mut ledger = Ledger::default();
        let goal = ledger
            .add_goal(GoalInput {
                name: " Bike ".into(),
                target_amount: 3_000_000.0,
                current_amount: 3_500_000.0,
                target_date: None,
            })
            .unwrap();
        assert_eq!(goal.name, "Bike");

        let empty = GoalInput { name: " ".into(), target_amount: 1.0, current_amount: 0.0, target_date: None };
        assert!(ledger.add_goal(empty).is_err());

        ledger.delete_goal(&goal.id).unwrap();
        assert!(ledger.goals.is_empty());
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut ledger = Ledger::default();
        let tx = ledger.add_transaction(lunch()).unwrap();
        let mut changed = tx.clone();
        changed.description = "Dinner".into();
        ledger.upsert_transaction(changed).unwrap();
        assert_eq!(ledger.transactions.len(), 1);
        assert_eq!(ledger.transactions[0].description, "Dinner");
    }

    #[test]
    fn upserts_enforce_record_rules() {
        let mut ledger = Ledger::default();
        let tx = ledger.add_transaction(lunch()).unwrap();

        let mut negative = tx.clone();
        negative.amount = -5_000.0;
        assert!(ledger.upsert_transaction(negative).is_err());
        let mut uncategorised = tx.clone();
        uncategorised.category = String::new();
        assert!(ledger.upsert_transaction(uncategorised).is_err());
        assert_eq!(ledger.transaction(&tx.id).unwrap(), &tx);

        let goal = Goal {
            id: new_id(),
            name: "Trip".into(),
            target_amount: 1_000_000.0,
            current_amount: 0.0,
            target_date: None,
        };
        for bad in [
            Goal { name: " ".into(), ..goal.clone() },
            Goal { target_amount: 0.0, ..goal.clone() },
            Goal { current_amount: -1.0, ..goal.clone() },
        ] {
            assert!(matches!(ledger.upsert_goal(bad), Err(FinError::Validation(_))));
        }
        assert!(ledger.goals.is_empty());
        ledger.upsert_goal(goal).unwrap();
    }

    #[test]
    fn whole_ledger_validation_finds_bad_records() {
        let mut ledger = Ledger::default();
        ledger.add_transaction(lunch()).unwrap();
        assert!(ledger.validate().is_ok());

        ledger.budgets.insert("Food".into(), -1.0);
        assert!(ledger.validate().is_err());
        ledger.budgets.insert("Food".into(), 1.0);

        ledger.transactions[0].amount = 0.0;
        assert!(matches!(ledger.validate(), Err(FinError::Validation(_))));
    }

    #[test]
    fn profile_edits_validate_email() {
        let mut profile = Profile { name: "A".into(), email: "a@x.io".into(), avatar: None };
        assert!(apply_profile(&mut profile, "A", "not-an-email", None).is_err());
        apply_profile(&mut profile, " Ana ", "ana@x.io", Some(Some("data:image/png;base64,AA".into()))).unwrap();
        assert_eq!(profile.name, "Ana");
        assert!(profile.avatar.is_some());
        apply_profile(&mut profile, "Ana", "ana@x.io", Some(None)).unwrap();
        assert_eq!(profile.avatar, None);
    }
}
