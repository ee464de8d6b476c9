use std::collections::HashMap;
use std::mem::swap;

use serde::Serialize;

use crate::balance::compute_balance;
use crate::schemas::{Expense, User, UserKey};
use crate::split::EPSILON;

#[derive(Clone, Debug)]
struct PersonalBalance {
    id: UserKey,
    balance: f64,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct UserPair {
    user1: UserKey,
    user2: UserKey,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Exchange {
    pub payer: String,
    pub receiver: String,
    pub amount: f64,
}

struct Transfer {
    payer: UserKey,
    receiver: UserKey,
    amount: f64,
}

// The transfers that settle every expense on its own, netted per pair of users
fn get_naive_transfers(expenses: &[Expense]) -> Vec<Transfer> {
    let mut balances_between_people: HashMap<UserPair, f64> = HashMap::new();

    for expense in expenses {
        for split in &expense.splits {
            if split.user_id == expense.payer {
                continue;
            }
            let mut pair = UserPair {
                user1: expense.payer,
                user2: split.user_id,
            };
            let mut amount = split.amount;

            // Keep every pair in the same direction so debts in both ways cancel
            if pair.user1 > pair.user2 {
                swap(&mut pair.user1, &mut pair.user2);
                amount = -amount;
            }

            *balances_between_people.entry(pair).or_insert(0.0) += amount;
        }
    }

    // user2 owes user1 a positive balance
    balances_between_people
        .into_iter()
        .filter(|(_, balance)| balance.abs() >= EPSILON)
        .map(|(pair, balance)| {
            let mut payer = pair.user2;
            let mut receiver = pair.user1;
            if balance < 0.0 {
                swap(&mut payer, &mut receiver);
            }
            Transfer {
                payer,
                receiver,
                amount: round_to_2_decimals(balance.abs()),
            }
        })
        .collect()
}

// Greedily matches the largest debtor with the largest creditor
fn get_simplified_transfers(
    mut payers: Vec<PersonalBalance>,
    mut receivers: Vec<PersonalBalance>,
) -> Vec<Transfer> {
    payers.sort_by(|a, b| a.balance.total_cmp(&b.balance));
    receivers.sort_by(|a, b| a.balance.total_cmp(&b.balance));

    let mut transfers = Vec::new();

    loop {
        let (Some(payer), Some(receiver)) = (payers.last_mut(), receivers.last_mut()) else {
            break;
        };
        let amount = payer.balance.min(receiver.balance);
        transfers.push(Transfer {
            payer: payer.id,
            receiver: receiver.id,
            amount: round_to_2_decimals(amount),
        });
        payer.balance = round_to_2_decimals(payer.balance - amount);
        receiver.balance = round_to_2_decimals(receiver.balance - amount);

        let payer_done = payer.balance < EPSILON;
        let receiver_done = receiver.balance < EPSILON;
        if payer_done {
            payers.pop();
        }
        if receiver_done {
            receivers.pop();
        }
    }
    transfers
}

fn round_to_2_decimals(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Transfers that bring every user's net balance back to zero, labelled by
/// email. Picks the greedy simplification unless it is not shorter than
/// settling expense by expense.
pub fn get_exchanges(expenses: &[Expense], directory: &HashMap<UserKey, User>) -> Vec<Exchange> {
    let mut payers = Vec::new();
    let mut receivers = Vec::new();

    for (id, totals) in compute_balance(expenses) {
        let net = totals.net_balance();
        if net.abs() < EPSILON {
            continue;
        }
        let person = PersonalBalance {
            id,
            balance: net.abs(),
        };
        if net < 0.0 {
            payers.push(person);
        } else {
            receivers.push(person);
        }
    }

    let naive = get_naive_transfers(expenses);
    let simplified = get_simplified_transfers(payers, receivers);
    let transfers = if simplified.len() < naive.len() {
        simplified
    } else {
        naive
    };

    let label = |key: &UserKey| {
        directory
            .get(key)
            .map(|user| user.email.clone())
            .unwrap_or_else(|| key.to_hex())
    };
    transfers
        .into_iter()
        .map(|transfer| Exchange {
            payer: label(&transfer.payer),
            receiver: label(&transfer.receiver),
            amount: transfer.amount,
        })
        .collect()
}
