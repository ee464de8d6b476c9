use std::collections::{BTreeMap, HashMap};

use bson::{oid::ObjectId, DateTime};

use crate::error::{ApiError, SplitError};
use crate::identity::resolve_user;
use crate::schemas::{Expense, ExpenseInput, Split, SplitPolicy, SplitValue, User, UserKey};
use crate::store::Repository;

/// Absolute tolerance for the sum checks of `Exact` and `Percentage`.
pub const EPSILON: f64 = 0.01;

pub fn almost_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// A user reached through the identifier the client sent.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    pub key: String,
    pub user: UserKey,
}

/// One `split_details` entry after resolution and numeric conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct Share {
    pub key: String,
    pub user: UserKey,
    pub value: f64,
}

pub async fn resolve_shares(
    repo: &dyn Repository,
    details: &BTreeMap<String, SplitValue>,
) -> Result<Vec<Share>, ApiError> {
    let mut shares = Vec::with_capacity(details.len());
    for (key, value) in details {
        let value = value
            .to_f64()
            .ok_or_else(|| SplitError::InvalidAmount(key.clone()))?;
        let user = match resolve_user(repo, key).await {
            Ok(user) => user,
            Err(ApiError::Identity(err)) => {
                return Err(SplitError::InvalidParticipant {
                    key: key.clone(),
                    reason: err.to_string(),
                }
                .into())
            }
            Err(err) => return Err(err),
        };
        shares.push(Share {
            key: key.clone(),
            user: user.id,
            value,
        });
    }
    Ok(shares)
}

/// Computes what each participant owes, in participant order.
///
/// `participants` must be non-empty and free of duplicates. `shares` is
/// ignored for [`SplitPolicy::Equal`] and required otherwise; it must name
/// every participant exactly once and nobody else.
pub fn compute_splits(
    amount: f64,
    policy: SplitPolicy,
    participants: &[Resolved],
    shares: Option<&[Share]>,
) -> Result<Vec<Split>, SplitError> {
    match policy {
        SplitPolicy::Equal => {
            let each = amount / participants.len() as f64;
            Ok(participants
                .iter()
                .map(|p| Split {
                    user_id: p.user,
                    amount: each,
                })
                .collect())
        }
        SplitPolicy::Exact => {
            let shares = shares.ok_or(SplitError::SplitDetailsRequired("Exact"))?;
            let total: f64 = shares.iter().map(|s| s.value).sum();
            if !almost_equal(total, amount) {
                return Err(SplitError::SplitMismatch(
                    "Sum of exact amounts does not equal total amount",
                ));
            }
            match_shares(participants, shares, |value| value)
        }
        SplitPolicy::Percentage => {
            let shares = shares.ok_or(SplitError::SplitDetailsRequired("Percentage"))?;
            let total: f64 = shares.iter().map(|s| s.value).sum();
            if !almost_equal(total, 100.0) {
                return Err(SplitError::SplitMismatch(
                    "Sum of percentages must be exactly 100%",
                ));
            }
            match_shares(participants, shares, |value| value / 100.0 * amount)
        }
    }
}

fn match_shares(
    participants: &[Resolved],
    shares: &[Share],
    owed: impl Fn(f64) -> f64,
) -> Result<Vec<Split>, SplitError> {
    for (i, share) in shares.iter().enumerate() {
        if !participants.iter().any(|p| p.user == share.user) {
            return Err(SplitError::InvalidParticipant {
                key: share.key.clone(),
                reason: "not listed among the participants".to_string(),
            });
        }
        if shares[..i].iter().any(|s| s.user == share.user) {
            return Err(SplitError::InvalidParticipant {
                key: share.key.clone(),
                reason: "user appears more than once in split_details".to_string(),
            });
        }
    }
    participants
        .iter()
        .map(|p| {
            shares
                .iter()
                .find(|s| s.user == p.user)
                .map(|s| Split {
                    user_id: p.user,
                    amount: owed(s.value),
                })
                .ok_or_else(|| SplitError::MissingShare(p.key.clone()))
        })
        .collect()
}

/// Runs the whole creation flow short of persisting: resolves the payer and
/// the participants, then computes the split snapshot. Also returns every
/// resolved user by id, so the expense can be rendered without another read.
pub async fn prepare_expense(
    repo: &dyn Repository,
    input: ExpenseInput,
) -> Result<(Expense, HashMap<UserKey, User>), ApiError> {
    let input = input.normalized()?;
    let policy: SplitPolicy = input.split_type.parse()?;

    let payer = resolve_user(repo, &input.created_by)
        .await
        .map_err(|err| match err {
            ApiError::Identity(err) => {
                ApiError::identity_in("Invalid 'created_by' identifier", err)
            }
            other => other,
        })?;

    let mut directory = HashMap::from([(payer.id, payer.clone())]);
    let mut participants: Vec<Resolved> = Vec::with_capacity(input.participants.len());
    for key in &input.participants {
        let user = resolve_user(repo, key).await.map_err(|err| match err {
            ApiError::Identity(err) => {
                ApiError::identity_in(format!("Invalid participant identifier '{key}'"), err)
            }
            other => other,
        })?;
        if participants.iter().all(|p| p.user != user.id) {
            participants.push(Resolved {
                key: key.clone(),
                user: user.id,
            });
        }
        directory.insert(user.id, user);
    }

    let shares = match (&input.split_details, policy) {
        (_, SplitPolicy::Equal) | (None, _) => None,
        (Some(details), _) => Some(resolve_shares(repo, details).await?),
    };
    let splits = compute_splits(input.amount, policy, &participants, shares.as_deref())?;

    let expense = Expense {
        id: ObjectId::new(),
        description: input.description,
        amount: input.amount,
        payer: payer.id,
        split_type: policy,
        participants: participants.into_iter().map(|p| p.user).collect(),
        splits,
        created_at: DateTime::now(),
    };
    Ok((expense, directory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;
    use crate::schemas::NewUser;

    fn people(n: usize) -> Vec<Resolved> {
        (0..n)
            .map(|i| Resolved {
                key: format!("user{i}"),
                user: ObjectId::new(),
            })
            .collect()
    }

    fn shares(people: &[Resolved], values: &[f64]) -> Vec<Share> {
        people
            .iter()
            .zip(values)
            .map(|(p, v)| Share {
                key: p.key.clone(),
                user: p.user,
                value: *v,
            })
            .collect()
    }

    #[test]
    fn equal_split_divides_evenly() {
        let people = people(3);
        let splits = compute_splits(100.0, SplitPolicy::Equal, &people, None).unwrap();
        assert_eq!(splits.len(), 3);
        for split in &splits {
            assert_eq!(split.amount, 100.0 / 3.0);
        }
        let total: f64 = splits.iter().map(|s| s.amount).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn exact_split_keeps_literal_values() {
        let people = people(2);
        let shares = shares(&people, &[70.0, 30.0]);
        let splits = compute_splits(100.0, SplitPolicy::Exact, &people, Some(&shares)).unwrap();
        assert_eq!(splits[0].amount, 70.0);
        assert_eq!(splits[1].amount, 30.0);
    }

    #[test]
    fn exact_split_tolerance_boundary() {
        let people = people(2);
        let within = shares(&people, &[70.0, 30.009]);
        assert!(compute_splits(100.0, SplitPolicy::Exact, &people, Some(&within)).is_ok());
        let beyond = shares(&people, &[70.0, 30.02]);
        assert_eq!(
            compute_splits(100.0, SplitPolicy::Exact, &people, Some(&beyond)).unwrap_err(),
            SplitError::SplitMismatch("Sum of exact amounts does not equal total amount")
        );
    }

    #[test]
    fn percentage_split_scales_amount() {
        let people = people(2);
        let shares = shares(&people, &[60.0, 40.0]);
        let splits =
            compute_splits(100.0, SplitPolicy::Percentage, &people, Some(&shares)).unwrap();
        assert_eq!(splits[0].amount, 60.0);
        assert_eq!(splits[1].amount, 40.0);

        let splits =
            compute_splits(250.0, SplitPolicy::Percentage, &people, Some(&shares)).unwrap();
        assert_eq!(splits[0].amount, 150.0);
        assert_eq!(splits[1].amount, 100.0);
    }

    #[test]
    fn percentage_split_tolerance_boundary() {
        let people = people(2);
        let within = shares(&people, &[60.0, 39.995]);
        let splits =
            compute_splits(100.0, SplitPolicy::Percentage, &people, Some(&within)).unwrap();
        assert_eq!(splits[0].amount, 60.0);
        assert_eq!(splits[1].amount, 39.995);
        let beyond = shares(&people, &[60.0, 39.98]);
        assert_eq!(
            compute_splits(100.0, SplitPolicy::Percentage, &people, Some(&beyond)).unwrap_err(),
            SplitError::SplitMismatch("Sum of percentages must be exactly 100%")
        );
    }

    #[test]
    fn percentage_split_rejects_bad_total() {
        let people = people(2);
        let shares = shares(&people, &[60.0, 39.0]);
        assert_eq!(
            compute_splits(100.0, SplitPolicy::Percentage, &people, Some(&shares)).unwrap_err(),
            SplitError::SplitMismatch("Sum of percentages must be exactly 100%")
        );
    }

    #[test]
    fn details_are_required_for_weighted_policies() {
        let people = people(1);
        assert_eq!(
            compute_splits(10.0, SplitPolicy::Exact, &people, None).unwrap_err(),
            SplitError::SplitDetailsRequired("Exact")
        );
        assert_eq!(
            compute_splits(10.0, SplitPolicy::Percentage, &people, None).unwrap_err(),
            SplitError::SplitDetailsRequired("Percentage")
        );
    }

    #[test]
    fn omitted_participant_is_rejected() {
        let people = people(3);
        let shares = shares(&people[..2], &[50.0, 50.0]);
        assert_eq!(
            compute_splits(100.0, SplitPolicy::Exact, &people, Some(&shares)).unwrap_err(),
            SplitError::MissingShare("user2".to_string())
        );
    }

    #[test]
    fn outsider_in_details_is_rejected() {
        let people = people(2);
        let outsider = Share {
            key: "outsider".to_string(),
            user: ObjectId::new(),
            value: 40.0,
        };
        let mut shares = shares(&people, &[30.0, 30.0]);
        shares.push(outsider);
        let err = compute_splits(100.0, SplitPolicy::Exact, &people, Some(&shares)).unwrap_err();
        assert!(matches!(err, SplitError::InvalidParticipant { key, .. } if key == "outsider"));
    }

    async fn seeded() -> MemoryRepository {
        let repo = MemoryRepository::new();
        for (name, email, mobile) in [
            ("Alice", "a@x.com", "9000000001"),
            ("Bob", "b@x.com", "9000000002"),
        ] {
            let user = NewUser {
                name: name.to_string(),
                email: email.to_string(),
                mobile_number: mobile.to_string(),
            }
            .into_user();
            repo.insert_user(user).await.unwrap();
        }
        repo
    }

    fn input(split_type: &str, details: Option<Vec<(&str, SplitValue)>>) -> ExpenseInput {
        ExpenseInput {
            description: " Groceries ".to_string(),
            amount: 100.0,
            created_by: "a@x.com".to_string(),
            split_type: split_type.to_string(),
            participants: vec!["a@x.com".to_string(), "Bob".to_string()],
            split_details: details.map(|entries| {
                entries
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect()
            }),
        }
    }

    #[tokio::test]
    async fn prepares_percentage_expense() {
        let repo = seeded().await;
        let (expense, directory) = prepare_expense(
            &repo,
            input(
                "Percentage",
                Some(vec![("a@x.com", SplitValue::Int64(60)), ("b@x.com", SplitValue::Int64(40))]),
            ),
        )
        .await
        .unwrap();
        assert_eq!(expense.description, "Groceries");
        assert_eq!(expense.splits.len(), 2);
        assert_eq!(expense.splits[0].amount, 60.0);
        assert_eq!(expense.splits[1].amount, 40.0);
        assert_eq!(expense.payer, expense.participants[0]);
        assert_eq!(directory.len(), 2);
        assert_eq!(directory[&expense.participants[1]].email, "b@x.com");
    }

    #[tokio::test]
    async fn duplicate_participants_collapse() {
        let repo = seeded().await;
        let mut input = input("Equal", None);
        input.participants.push("A@X.COM".to_string());
        let (expense, _) = prepare_expense(&repo, input).await.unwrap();
        assert_eq!(expense.participants.len(), 2);
        assert_eq!(expense.splits[0].amount, 50.0);
    }

    #[tokio::test]
    async fn rejects_unknown_detail_key_and_non_numeric_value() {
        let repo = seeded().await;
        let err = prepare_expense(
            &repo,
            input(
                "Exact",
                Some(vec![("a@x.com", SplitValue::Int64(60)), ("zed@x.com", SplitValue::Int64(40))]),
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Split(SplitError::InvalidParticipant { ref key, .. }) if key == "zed@x.com"
        ));

        let err = prepare_expense(
            &repo,
            input(
                "Exact",
                Some(vec![
                    ("a@x.com", SplitValue::Int64(60)),
                    ("b@x.com", SplitValue::Other(serde_json::json!("40"))),
                ]),
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Split(SplitError::InvalidAmount(ref key)) if key == "b@x.com"
        ));
    }

    #[tokio::test]
    async fn rejects_unknown_policy_and_payer() {
        let repo = seeded().await;
        let err = prepare_expense(&repo, input("Shares", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Split(SplitError::InvalidPolicy(_))));

        let mut bad_payer = input("Equal", None);
        bad_payer.created_by = "nobody@x.com".to_string();
        let err = prepare_expense(&repo, bad_payer).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid 'created_by' identifier: no user found with the given email"
        );
    }
}
