use std::collections::HashMap;

use crate::schemas::{Expense, User, UserKey};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Totals {
    pub total_spent: f64,
    pub total_owed: f64,
}

impl Totals {
    pub fn net_balance(&self) -> f64 {
        self.total_spent - self.total_owed
    }
}

pub type Balance = HashMap<UserKey, Totals>;

/// Sums, in a single pass over `expenses`, what every user paid and what
/// every user owes according to the stored split snapshots.
pub fn compute_balance(expenses: &[Expense]) -> Balance {
    let mut balance = Balance::new();
    for expense in expenses {
        balance.entry(expense.payer).or_default().total_spent += expense.amount;
        for participant in &expense.participants {
            if let Some(owed) = expense.owed_by(participant) {
                balance.entry(*participant).or_default().total_owed += owed;
            }
        }
    }
    balance
}

#[derive(Clone, Debug, PartialEq)]
pub struct BalanceRow {
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub total_spent: f64,
    pub total_owed: f64,
    pub net_balance: f64,
}

/// One row per user, in the order of `users`. Users without any expense get
/// zero totals.
pub fn balance_sheet(users: &[User], expenses: &[Expense]) -> Vec<BalanceRow> {
    let balance = compute_balance(expenses);
    users
        .iter()
        .map(|user| {
            let totals = balance.get(&user.id).copied().unwrap_or_default();
            BalanceRow {
                name: user.name.clone(),
                email: user.email.clone(),
                mobile_number: user.mobile_number.clone(),
                total_spent: totals.total_spent,
                total_owed: totals.total_owed,
                net_balance: totals.net_balance(),
            }
        })
        .collect()
}
