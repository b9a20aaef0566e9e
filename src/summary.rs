//! Dashboard figures computed from a ledger for a reference day.
//!
//! Nothing here renders charts; the series are shaped so a charting library
//! can plot them directly.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{Kind, Ledger, Transaction, icon_class};

const CASH_FLOW_MONTHS: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetLevel {
    /// No budget set for the category.
    None,
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_balance: f64,
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    /// Percent of this month's income not spent; 0 without income.
    pub savings_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySpend {
    pub category: String,
    pub icon_class: String,
    pub spent: f64,
    pub budget: Option<f64>,
    pub progress: f64,
    pub level: BudgetLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLine {
    pub category: String,
    pub budget: f64,
    pub spent: f64,
    pub remaining: f64,
    pub progress: f64,
    pub level: BudgetLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowPoint {
    /// `YYYY-MM`
    pub month: String,
    pub label: String,
    pub income: f64,
    pub expenses: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendLine {
    pub category: String,
    pub last_month: f64,
    pub this_month: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub id: String,
    pub name: String,
    pub target_amount: f64,
    pub current_amount: f64,
    pub progress: f64,
    pub target_date: Option<NaiveDate>,
    pub overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub year: i32,
    pub month: u32,
    pub totals: Totals,
    pub expenses_by_category: Vec<CategorySpend>,
    pub budgets: Vec<BudgetLine>,
    pub cash_flow: Vec<CashFlowPoint>,
    pub spending_trends: Vec<TrendLine>,
    pub goals: Vec<GoalProgress>,
}

/// Everything the dashboard, budgets, analytics and goals pages show.
pub fn dashboard(ledger: &Ledger, today: NaiveDate) -> Dashboard {
    Dashboard {
        year: today.year(),
        month: today.month(),
        totals: totals(&ledger.transactions, today),
        expenses_by_category: expenses_by_category(ledger, today),
        budgets: budget_report(ledger, today),
        cash_flow: cash_flow(&ledger.transactions, today),
        spending_trends: spending_trends(ledger, today),
        goals: goal_progress(ledger, today),
    }
}

pub fn totals(transactions: &[Transaction], today: NaiveDate) -> Totals {
    let mut total_income = 0.0;
    let mut total_expenses = 0.0;
    let mut monthly_income = 0.0;
    let mut monthly_expenses = 0.0;

    for tx in transactions {
        let this_month = same_month(tx.date, today);
        match tx.kind {
            Kind::Income => {
                total_income += tx.amount;
                if this_month {
                    monthly_income += tx.amount;
                }
            }
            Kind::Expense => {
                total_expenses += tx.amount;
                if this_month {
                    monthly_expenses += tx.amount;
                }
            }
        }
    }

    let savings_rate = if monthly_income > 0.0 {
        (monthly_income - monthly_expenses) / monthly_income * 100.0
    } else {
        0.0
    };

    Totals {
        total_balance: total_income - total_expenses,
        monthly_income,
        monthly_expenses,
        savings_rate,
    }
}

/// Percent of a budget used, capped at 100, with its colour band.
pub fn budget_progress(spent: f64, budget: Option<f64>) -> (f64, BudgetLevel) {
    match budget {
        None => (0.0, BudgetLevel::None),
        Some(limit) if limit > 0.0 => {
            let progress = (spent / limit * 100.0).min(100.0);
            let level = if progress >= 95.0 {
                BudgetLevel::Red
            } else if progress > 75.0 {
                BudgetLevel::Yellow
            } else {
                BudgetLevel::Green
            };
            (progress, level)
        }
        Some(_) => {
            if spent > 0.0 {
                (100.0, BudgetLevel::Red)
            } else {
                (0.0, BudgetLevel::Green)
            }
        }
    }
}

pub fn expenses_by_category(ledger: &Ledger, today: NaiveDate) -> Vec<CategorySpend> {
    let budgetable = ledger.expense_categories_for_budgeting();
    let spent = monthly_expenses_by_category(&ledger.transactions, today);

    spent
        .into_iter()
        .filter(|(category, _)| budgetable.contains(category))
        .map(|(category, spent)| {
            let budget = ledger.budgets.get(&category).copied();
            let (progress, level) = budget_progress(spent, budget);
            let icon_key = ledger
                .category(&category, Kind::Expense)
                .map(|c| c.icon_key.as_str())
                .unwrap_or("Other");
            CategorySpend {
                icon_class: icon_class(icon_key),
                category,
                spent,
                budget,
                progress,
                level,
            }
        })
        .collect()
}

pub fn budget_report(ledger: &Ledger, today: NaiveDate) -> Vec<BudgetLine> {
    let spent_by_category = monthly_expenses_by_category(&ledger.transactions, today);

    // Budgets is a BTreeMap, so lines come out sorted by category.
    ledger
        .budgets
        .iter()
        .map(|(category, budget)| {
            let spent = spent_by_category.get(category).copied().unwrap_or(0.0);
            let (progress, level) = budget_progress(spent, Some(*budget));
            BudgetLine {
                category: category.clone(),
                budget: *budget,
                spent,
                remaining: budget - spent,
                progress,
                level,
            }
        })
        .collect()
}

/// Income and expenses per month, from six months back through `today`'s month.
pub fn cash_flow(transactions: &[Transaction], today: NaiveDate) -> Vec<CashFlowPoint> {
    let (start_year, start_month) = shift_month(today.year(), today.month(), -CASH_FLOW_MONTHS);

    let mut buckets: Vec<CashFlowPoint> = (0..=CASH_FLOW_MONTHS)
        .map(|offset| {
            let (year, month) = shift_month(start_year, start_month, offset);
            let label = NaiveDate::from_ymd_opt(year, month, 1)
                .map(|d| d.format("%b").to_string())
                .unwrap_or_default();
            CashFlowPoint {
                month: format!("{}-{:02}", year, month),
                label,
                income: 0.0,
                expenses: 0.0,
            }
        })
        .collect();

    for tx in transactions {
        let key = format!("{}-{:02}", tx.date.year(), tx.date.month());
        if let Some(bucket) = buckets.iter_mut().find(|b| b.month == key) {
            match tx.kind {
                Kind::Income => bucket.income += tx.amount,
                Kind::Expense => bucket.expenses += tx.amount,
            }
        }
    }

    buckets
}

/// This month against last month for every expense category, sorted by name.
pub fn spending_trends(ledger: &Ledger, today: NaiveDate) -> Vec<TrendLine> {
    let mut names = ledger.expense_categories_for_budgeting();
    names.sort();
    names.dedup();

    let (last_year, last_month) = shift_month(today.year(), today.month(), -1);
    let mut lines: BTreeMap<String, TrendLine> = names
        .into_iter()
        .map(|name| {
            let line = TrendLine { category: name.clone(), last_month: 0.0, this_month: 0.0 };
            (name, line)
        })
        .collect();

    for tx in ledger.transactions.iter().filter(|tx| tx.kind == Kind::Expense) {
        let Some(line) = lines.get_mut(&tx.category) else {
            continue;
        };
        if same_month(tx.date, today) {
            line.this_month += tx.amount;
        } else if tx.date.year() == last_year && tx.date.month() == last_month {
            line.last_month += tx.amount;
        }
    }

    lines.into_values().collect()
}

pub fn goal_progress(ledger: &Ledger, today: NaiveDate) -> Vec<GoalProgress> {
    let mut goals: Vec<GoalProgress> = ledger
        .goals
        .iter()
        .map(|goal| {
            let progress = if goal.target_amount > 0.0 {
                (goal.current_amount / goal.target_amount * 100.0).min(100.0)
            } else if goal.current_amount > 0.0 {
                100.0
            } else {
                0.0
            };
            let overdue = goal
                .target_date
                .is_some_and(|date| date < today && goal.current_amount < goal.target_amount);
            GoalProgress {
                id: goal.id.clone(),
                name: goal.name.clone(),
                target_amount: goal.target_amount,
                current_amount: goal.current_amount,
                progress,
                target_date: goal.target_date,
                overdue,
            }
        })
        .collect();
    goals.sort_by(|a, b| a.name.cmp(&b.name));
    goals
}

fn monthly_expenses_by_category(transactions: &[Transaction], today: NaiveDate) -> BTreeMap<String, f64> {
    let mut spent = BTreeMap::new();
    for tx in transactions {
        if tx.kind == Kind::Expense && same_month(tx.date, today) {
            *spent.entry(tx.category.clone()).or_insert(0.0) += tx.amount;
        }
    }
    spent
}

fn same_month(date: NaiveDate, today: NaiveDate) -> bool {
    date.year() == today.year() && date.month() == today.month()
}

/// Move `delta` months from (year, month), month being 1-based.
pub fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + (month as i32 - 1) + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}
