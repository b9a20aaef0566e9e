//! Payload of `POST /api/data/sync` and how the server folds it into storage.
//!
//! The merge is last-write-wins per record: pushed transactions and goals
//! replace the stored ones with the same id, custom categories are added when
//! missing, and the budget map is replaced wholesale. Deletions travel as
//! tombstones and are applied first.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{FinError, Result};
use crate::ledger::check_budget;
use crate::model::{Budgets, Category, CategoryRef, Goal, Ledger, Snapshot, Transaction};
use crate::store::Database;

/// Profile fields a client may push. Email changes go through the profile endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Outer `None`: leave untouched. `Some(None)`: clear the avatar.
    #[serde(default, deserialize_with = "crate::model::present", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfilePatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budgets: Option<Budgets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<Goal>>,
    /// Ids the client deleted since its last successful sync.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_transactions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_goals: Vec<String>,
    /// Custom categories deleted since the last sync. Defaults are never removed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_categories: Vec<CategoryRef>,
}

/// Deletions a client has made since its last successful sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstones {
    #[serde(default)]
    pub transactions: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
}

impl Tombstones {
    pub fn len(&self) -> usize {
        self.transactions.len() + self.goals.len() + self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SyncPush {
    /// Push everything a client holds, plus its pending deletions.
    pub fn full(snapshot: &Snapshot, deleted: Tombstones) -> Self {
        SyncPush {
            profile: Some(ProfilePatch {
                name: Some(snapshot.profile.name.clone()).filter(|name| !name.trim().is_empty()),
                avatar: Some(snapshot.profile.avatar.clone()),
            }),
            transactions: Some(snapshot.ledger.transactions.clone()),
            categories: Some(snapshot.ledger.categories.clone()),
            budgets: Some(snapshot.ledger.budgets.clone()),
            goals: Some(snapshot.ledger.goals.clone()),
            deleted_transactions: deleted.transactions,
            deleted_goals: deleted.goals,
            deleted_categories: deleted.categories,
        }
    }

    /// Fold the ledger part of the push into `ledger`.
    pub fn merge_into(&self, ledger: &mut Ledger) -> Result<()> {
        for id in &self.deleted_transactions {
            ledger.transactions.retain(|tx| &tx.id != id);
        }
        for id in &self.deleted_goals {
            ledger.goals.retain(|g| &g.id != id);
        }
        for gone in &self.deleted_categories {
            ledger
                .categories
                .retain(|c| c.is_default || !c.same_identity(&gone.name, gone.kind));
        }

        if let Some(transactions) = &self.transactions {
            for tx in transactions {
                ledger.upsert_transaction(tx.clone())?;
            }
        }

        if let Some(categories) = &self.categories {
            for category in categories.iter().filter(|c| !c.is_default) {
                if category.name.trim().is_empty() {
                    return Err(FinError::validation("Category name cannot be empty."));
                }
                if ledger.category(&category.name, category.kind).is_none() {
                    ledger.categories.push(Category {
                        is_default: false,
                        ..category.clone()
                    });
                }
            }
        }

        if let Some(budgets) = &self.budgets {
            for (category, amount) in budgets {
                check_budget(category, *amount)?;
            }
            ledger.budgets = budgets.clone();
        }

        if let Some(goals) = &self.goals {
            for goal in goals {
                ledger.upsert_goal(goal.clone())?;
            }
        }

        Ok(())
    }
}

/// Apply a client push for `user_id`. Validation failures leave storage untouched.
pub fn apply_push(db: &Database, user_id: &str, push: &SyncPush) -> Result<()> {
    let profile = push.profile.as_ref().filter(|p| p.name.is_some() || p.avatar.is_some());
    if let Some(name) = profile.and_then(|p| p.name.as_deref()) {
        if name.trim().is_empty() {
            return Err(FinError::validation("Name cannot be empty."));
        }
    }

    db.with_ledger(user_id, |ledger| push.merge_into(ledger))?;

    if let Some(patch) = profile {
        db.update_user(user_id, |user| {
            if let Some(name) = &patch.name {
                user.name = name.trim().to_string();
            }
            if let Some(avatar) = &patch.avatar {
                user.avatar = avatar.clone();
            }
            Ok(())
        })?;
    }

    info!(
        "sync push for {}: {} transactions, {} goals, {} deletions",
        user_id,
        push.transactions.as_ref().map_or(0, Vec::len),
        push.goals.as_ref().map_or(0, Vec::len),
        push.deleted_transactions.len() + push.deleted_goals.len() + push.deleted_categories.len()
    );
    Ok(())
}
