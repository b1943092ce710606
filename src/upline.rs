use std::collections::HashSet;

use sqlx::{Postgres, Row, Transaction};
use tracing::warn;
use uuid::Uuid;

use crate::error::LedgerError;

/// One sponsor above a member, with its distance from that member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestor {
    pub user_id: i64,
    /// 1 = the immediate sponsor, 2 = the sponsor's sponsor, and so on.
    pub level: i32,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    Next(Ancestor),
    /// The configured depth limit was reached.
    DepthReached,
    /// The sponsor was already visited; the stored chain has a cycle.
    Cycle,
}

/// Guard for the sponsor-chain walk: tracks visited ids and the depth limit.
///
/// Nothing in the schema prevents a malformed sponsor cycle, so the walk must
/// not trust acyclicity; a repeat visit terminates it instead of looping.
#[derive(Debug)]
pub struct UplineWalk {
    seen: HashSet<i64>,
    next_level: i32,
    max_depth: u32,
}

impl UplineWalk {
    pub fn new(start_user: i64, max_depth: u32) -> UplineWalk {
        UplineWalk {
            seen: HashSet::from([start_user]),
            next_level: 1,
            max_depth,
        }
    }

    pub fn admit(&mut self, sponsor_id: i64) -> Step {
        if self.next_level as u32 > self.max_depth {
            return Step::DepthReached;
        }
        if !self.seen.insert(sponsor_id) {
            return Step::Cycle;
        }
        let level = self.next_level;
        self.next_level += 1;
        Step::Next(Ancestor {
            user_id: sponsor_id,
            level,
        })
    }
}

/// Walks the sponsor chain upward from `start_user`, tenant-scoped at each
/// step, and returns the ordered ancestor list. The walk ends at the first
/// member without a sponsor, at `max_depth`, or when a cycle is detected.
pub async fn resolve_upline(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    start_user: i64,
    max_depth: u32,
) -> Result<Vec<Ancestor>, LedgerError> {
    let mut walk = UplineWalk::new(start_user, max_depth);
    let mut ancestors = Vec::new();
    let mut current = start_user;

    loop {
        let row = sqlx::query("SELECT sponsor_id FROM members WHERE id = $1 AND tenant_id = $2")
            .bind(current)
            .bind(tenant_id)
            .fetch_optional(tx.as_mut())
            .await?;
        let Some(row) = row else { break };
        let Some(sponsor_id) = row.try_get::<Option<i64>, _>("sponsor_id")? else {
            break; // reached a tree root
        };

        match walk.admit(sponsor_id) {
            Step::Next(ancestor) => {
                current = ancestor.user_id;
                ancestors.push(ancestor);
            }
            Step::Cycle => {
                warn!(
                    %tenant_id,
                    member_id = sponsor_id,
                    "sponsor cycle detected, truncating upline"
                );
                break;
            }
            Step::DepthReached => break,
        }
    }

    Ok(ancestors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_count_up_from_the_immediate_sponsor() {
        let mut walk = UplineWalk::new(10, 10);
        assert_eq!(
            walk.admit(11),
            Step::Next(Ancestor {
                user_id: 11,
                level: 1
            })
        );
        assert_eq!(
            walk.admit(12),
            Step::Next(Ancestor {
                user_id: 12,
                level: 2
            })
        );
    }

    #[test]
    fn a_repeat_visit_ends_the_walk() {
        let mut walk = UplineWalk::new(10, 10);
        walk.admit(11);
        walk.admit(12);
        assert_eq!(walk.admit(11), Step::Cycle);
    }

    #[test]
    fn the_start_user_is_already_seen() {
        // member sponsoring itself must not produce a level-1 self-payment
        let mut walk = UplineWalk::new(10, 10);
        assert_eq!(walk.admit(10), Step::Cycle);
    }

    #[test]
    fn the_depth_limit_caps_the_walk() {
        let mut walk = UplineWalk::new(0, 3);
        for id in 1..=3 {
            assert!(matches!(walk.admit(id), Step::Next(_)));
        }
        assert_eq!(walk.admit(4), Step::DepthReached);
    }

    #[test]
    fn zero_depth_admits_nobody() {
        let mut walk = UplineWalk::new(0, 0);
        assert_eq!(walk.admit(1), Step::DepthReached);
    }
}
