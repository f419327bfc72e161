//! Winner selection. Pure: no store access, the caller supplies the closed
//! pool and a random source.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{CampaignType, UserId};

/// Upper bound on winners for loyalty-grant gated campaigns.
pub const BOOST_DRAW_CAP: usize = 200;

/// Closed participation set at draw time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawPool {
    /// Eligible entrants, each listed once.
    Entrants(Vec<UserId>),
    /// Referrer with the number of users they brought in.
    ReferralCounts(Vec<(UserId, i64)>),
}

impl DrawPool {
    pub fn len(&self) -> usize {
        match self {
            DrawPool::Entrants(ids) => ids.len(),
            DrawPool::ReferralCounts(counts) => counts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait SelectionStrategy: Sync {
    fn select(&self, pool: &DrawPool, winners_count: usize, rng: &mut dyn rand::RngCore)
        -> Vec<UserId>;
}

struct UniformSample {
    cap: Option<usize>,
}

struct ReferralRanking;

static UNIFORM: UniformSample = UniformSample { cap: None };
static BOOST_CAPPED: UniformSample = UniformSample {
    cap: Some(BOOST_DRAW_CAP),
};
static REFERRAL_RANKING: ReferralRanking = ReferralRanking;

/// One strategy per campaign type.
pub fn strategy_for(kind: CampaignType) -> &'static dyn SelectionStrategy {
    match kind {
        CampaignType::DirectOptIn | CampaignType::SingleComment => &UNIFORM,
        CampaignType::BoostGated => &BOOST_CAPPED,
        CampaignType::Referral => &REFERRAL_RANKING,
    }
}

pub fn select_winners<R: Rng>(
    kind: CampaignType,
    pool: &DrawPool,
    winners_count: usize,
    rng: &mut R,
) -> Vec<UserId> {
    strategy_for(kind).select(pool, winners_count, rng)
}

fn unique_ids(pool: &DrawPool) -> Vec<UserId> {
    let mut ids: Vec<UserId> = match pool {
        DrawPool::Entrants(ids) => ids.clone(),
        DrawPool::ReferralCounts(counts) => counts.iter().map(|(id, _)| *id).collect(),
    };
    ids.sort_unstable();
    ids.dedup();
    ids
}

impl SelectionStrategy for UniformSample {
    fn select(
        &self,
        pool: &DrawPool,
        winners_count: usize,
        rng: &mut dyn rand::RngCore,
    ) -> Vec<UserId> {
        let candidates = unique_ids(pool);
        let k = match self.cap {
            Some(cap) => winners_count.min(cap),
            None => winners_count,
        };
        candidates
            .choose_multiple(rng, k.min(candidates.len()))
            .copied()
            .collect()
    }
}

impl SelectionStrategy for ReferralRanking {
    fn select(
        &self,
        pool: &DrawPool,
        winners_count: usize,
        rng: &mut dyn rand::RngCore,
    ) -> Vec<UserId> {
        let counts = match pool {
            DrawPool::ReferralCounts(counts) => counts.clone(),
            DrawPool::Entrants(ids) => ids.iter().map(|id| (*id, 1)).collect(),
        };

        let mut buckets: BTreeMap<i64, Vec<UserId>> = BTreeMap::new();
        for (referrer, count) in counts {
            if count <= 0 {
                continue;
            }
            let bucket = buckets.entry(count).or_default();
            if !bucket.contains(&referrer) {
                bucket.push(referrer);
            }
        }

        let mut selected = Vec::with_capacity(winners_count);
        for (_, mut bucket) in buckets.into_iter().rev() {
            let need = winners_count - selected.len();
            if need == 0 {
                break;
            }
            bucket.shuffle(rng);
            bucket.truncate(need);
            selected.extend(bucket);
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    const A: UserId = 1;
    const B: UserId = 2;
    const C: UserId = 3;

    fn referral_pool() -> DrawPool {
        DrawPool::ReferralCounts(vec![(A, 3), (B, 3), (C, 1)])
    }

    #[test]
    fn test_referral_single_winner_from_top_bucket() {
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let winners = select_winners(CampaignType::Referral, &referral_pool(), 1, &mut rng);
            assert_eq!(winners.len(), 1);
            assert!(winners[0] == A || winners[0] == B, "C must never win with k=1");
        }
    }

    #[test]
    fn test_referral_top_bucket_fills_exactly() {
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let winners = select_winners(CampaignType::Referral, &referral_pool(), 2, &mut rng);
            let set: HashSet<_> = winners.iter().copied().collect();
            assert_eq!(set, HashSet::from([A, B]));
        }
    }

    #[test]
    fn test_referral_tie_order_varies() {
        let mut firsts = HashSet::new();
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let winners = select_winners(CampaignType::Referral, &referral_pool(), 1, &mut rng);
            firsts.insert(winners[0]);
        }
        assert_eq!(firsts, HashSet::from([A, B]));
    }

    #[test]
    fn test_referral_descends_into_lower_bucket() {
        let mut rng = StdRng::seed_from_u64(7);
        let winners = select_winners(CampaignType::Referral, &referral_pool(), 5, &mut rng);
        assert_eq!(winners.len(), 3);
        assert_eq!(winners[2], C);
    }

    #[test]
    fn test_oversized_k_returns_whole_pool_once() {
        let pool = DrawPool::Entrants(vec![10, 11, 12, 13, 14]);
        for kind in [
            CampaignType::DirectOptIn,
            CampaignType::SingleComment,
            CampaignType::BoostGated,
        ] {
            let mut rng = StdRng::seed_from_u64(1);
            let mut winners = select_winners(kind, &pool, 10, &mut rng);
            winners.sort_unstable();
            assert_eq!(winners, vec![10, 11, 12, 13, 14]);
        }
    }

    #[test]
    fn test_uniform_sample_has_requested_size_and_unique_ids() {
        let pool = DrawPool::Entrants((1..=50).collect());
        let mut rng = StdRng::seed_from_u64(3);
        let winners = select_winners(CampaignType::DirectOptIn, &pool, 7, &mut rng);
        let set: HashSet<_> = winners.iter().copied().collect();
        assert_eq!(winners.len(), 7);
        assert_eq!(set.len(), 7);
        assert!(winners.iter().all(|id| (1..=50).contains(id)));
    }

    #[test]
    fn test_duplicate_entrants_counted_once() {
        let pool = DrawPool::Entrants(vec![5, 5, 5, 6]);
        let mut rng = StdRng::seed_from_u64(9);
        let mut winners = select_winners(CampaignType::DirectOptIn, &pool, 4, &mut rng);
        winners.sort_unstable();
        assert_eq!(winners, vec![5, 6]);
    }

    #[test]
    fn test_boost_gated_capped() {
        let pool = DrawPool::Entrants((1..=500).collect());
        let mut rng = StdRng::seed_from_u64(11);
        let winners = select_winners(CampaignType::BoostGated, &pool, 1000, &mut rng);
        assert_eq!(winners.len(), BOOST_DRAW_CAP);

        let uncapped = select_winners(CampaignType::DirectOptIn, &pool, 1000, &mut rng);
        assert_eq!(uncapped.len(), 500);
    }

    #[test]
    fn test_empty_pool_yields_no_winners() {
        for kind in CampaignType::ALL {
            let pool = match kind {
                CampaignType::Referral => DrawPool::ReferralCounts(vec![]),
                _ => DrawPool::Entrants(vec![]),
            };
            let mut rng = StdRng::seed_from_u64(0);
            assert!(select_winners(kind, &pool, 3, &mut rng).is_empty());
        }
    }
}
