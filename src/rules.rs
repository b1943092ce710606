use std::collections::HashMap;

use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::upline::Ancestor;

/// Per-tenant mapping from commission level to payout percentage.
///
/// Percentages are whole percents (`10` = 10%). A level with no configured
/// rule simply earns nothing; it is never an error.
#[derive(Debug, Default)]
pub struct RuleSet {
    by_level: HashMap<i32, i32>,
}

impl RuleSet {
    pub async fn load(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
    ) -> Result<RuleSet, LedgerError> {
        let rows = sqlx::query("SELECT level, percentage FROM commission_rules WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_all(tx.as_mut())
            .await?;

        let mut by_level = HashMap::with_capacity(rows.len());
        for row in rows {
            by_level.insert(row.try_get("level")?, row.try_get("percentage")?);
        }
        Ok(RuleSet { by_level })
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (i32, i32)>) -> RuleSet {
        RuleSet {
            by_level: pairs.into_iter().collect(),
        }
    }

    pub fn percentage_for(&self, level: i32) -> Option<i32> {
        self.by_level.get(&level).copied()
    }
}

/// A single wallet credit an order will produce.
#[derive(Debug, PartialEq, Eq)]
pub struct CommissionCredit {
    pub recipient_user_id: i64,
    pub level: i32,
    pub amount: i64,
}

pub fn percent_of(amount: i64, percent: i32) -> i64 {
    ((amount as i128 * percent as i128) / 100) as i64
}

/// Computes the commission set for one order: one credit per upline ancestor
/// whose level has a positive percentage. The order placer is never in the
/// upline, so the plan can never self-pay.
pub fn commission_plan(
    total_amount: i64,
    rules: &RuleSet,
    upline: &[Ancestor],
) -> Vec<CommissionCredit> {
    upline
        .iter()
        .filter_map(|ancestor| {
            let pct = rules.percentage_for(ancestor.level)?;
            if pct <= 0 {
                return None;
            }
            let amount = percent_of(total_amount, pct);
            (amount > 0).then_some(CommissionCredit {
                recipient_user_id: ancestor.user_id,
                level: ancestor.level,
                amount,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(ids: &[i64]) -> Vec<Ancestor> {
        ids.iter()
            .enumerate()
            .map(|(i, &user_id)| Ancestor {
                user_id,
                level: i as i32 + 1,
            })
            .collect()
    }

    #[test]
    fn two_level_chain_pays_sponsor_and_grandsponsor() {
        // C places the order; B is the sponsor (level 1), A the grandsponsor (level 2).
        let rules = RuleSet::from_pairs([(1, 10), (2, 5)]);
        let upline = chain(&[2, 1]); // B = 2, A = 1

        let plan = commission_plan(1000, &rules, &upline);

        assert_eq!(
            plan,
            vec![
                CommissionCredit {
                    recipient_user_id: 2,
                    level: 1,
                    amount: 100,
                },
                CommissionCredit {
                    recipient_user_id: 1,
                    level: 2,
                    amount: 50,
                },
            ]
        );
    }

    #[test]
    fn unconfigured_levels_are_skipped_silently() {
        let rules = RuleSet::from_pairs([(1, 10)]);
        let plan = commission_plan(1000, &rules, &chain(&[2, 1, 9]));

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].recipient_user_id, 2);
    }

    #[test]
    fn zero_percentage_earns_nothing() {
        let rules = RuleSet::from_pairs([(1, 0), (2, 5)]);
        let plan = commission_plan(1000, &rules, &chain(&[2, 1]));

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].level, 2);
    }

    #[test]
    fn total_payout_is_bounded_by_the_rule_sum() {
        let rules = RuleSet::from_pairs([(1, 10), (2, 5), (3, 2)]);
        let total = 999_999;
        let plan = commission_plan(total, &rules, &chain(&[5, 4, 3, 2, 1]));

        let payout: i64 = plan.iter().map(|c| c.amount).sum();
        assert!(payout <= percent_of(total, 17));
    }

    #[test]
    fn empty_upline_produces_no_credits() {
        let rules = RuleSet::from_pairs([(1, 10)]);
        assert!(commission_plan(1000, &rules, &[]).is_empty());
    }

    #[test]
    fn percent_of_truncates_and_survives_large_amounts() {
        assert_eq!(percent_of(999, 10), 99);
        assert_eq!(percent_of(1, 5), 0);
        // the i128 intermediate means no overflow at the extremes
        assert_eq!(percent_of(i64::MAX, 100), i64::MAX);
        assert_eq!(percent_of(i64::MAX, 50), i64::MAX / 2);
    }
}
