use crate::constants::{
    MID_TIER_HUNDREDTHS, MID_TIER_MAX_RANKS, PERCENT_SCALE, TAIL_TIER_FIRST_RANK,
    TAIL_TIER_HUNDREDTHS, TOP_TIER_HUNDREDTHS,
};

/// One rank's payout. `prize_amount` is in the smallest currency unit,
/// `percentage` is for display only.
#[derive(Debug, Clone, PartialEq)]
pub struct PrizeEntry {
    pub rank: u64,
    pub prize_amount: u128,
    pub percentage: f64,
}

struct TierShare {
    percentage: f64,
    hundredths: u128,
}

/// Number of ranks that receive a prize: half the field, at least one.
pub fn winners_count(total_participants: u64) -> u64 {
    (total_participants / 2).max(1)
}

/// Compute the payout schedule for a lobby.
///
/// Ranks 1-3 take 40/25/15 percent, ranks 4-10 split 15 percent and ranks
/// past 10 split the last 5 percent. Each share is truncated to hundredths of
/// a percent before it is applied to the pool. Whatever the tiers leave
/// unassigned, including tiers with no ranks, is credited to rank 1.
pub fn distribute(total_participants: u64, prize_pool: u128) -> Vec<PrizeEntry> {
    if total_participants == 0 || prize_pool == 0 {
        return Vec::new();
    }

    let winners = winners_count(total_participants);
    let mid_count = winners.saturating_sub(3).min(MID_TIER_MAX_RANKS);
    let tail_count = winners.saturating_sub(TAIL_TIER_FIRST_RANK - 1);

    let mut entries = Vec::with_capacity(usize::try_from(winners).unwrap_or(0));
    let mut distributed_percentage = 0.0_f64;

    for rank in 1..=winners {
        let share = tier_share(rank, mid_count, tail_count);
        distributed_percentage += share.percentage;
        entries.push(PrizeEntry {
            rank,
            prize_amount: scale_by_hundredths(prize_pool, share.hundredths),
            percentage: share.percentage,
        });
    }

    if distributed_percentage < 100.0 {
        if let Some(first) = entries.first_mut() {
            let distributed_hundredths = (distributed_percentage * 100.0).floor() as u128;
            let remaining = PERCENT_SCALE.saturating_sub(distributed_hundredths);
            first.prize_amount += scale_by_hundredths(prize_pool, remaining);
            first.percentage += remaining as f64 / 100.0;
        }
    }

    entries
}

/// Prize for a single rank, or zero when the rank does not place.
pub fn get_prize_for_rank(rank: u64, total_participants: u64, prize_pool: u128) -> u128 {
    distribute(total_participants, prize_pool)
        .into_iter()
        .find(|entry| entry.rank == rank)
        .map(|entry| entry.prize_amount)
        .unwrap_or(0)
}

fn tier_share(rank: u64, mid_count: u64, tail_count: u64) -> TierShare {
    match rank {
        1..=3 => {
            let hundredths = TOP_TIER_HUNDREDTHS[(rank - 1) as usize];
            TierShare {
                percentage: hundredths as f64 / 100.0,
                hundredths,
            }
        }
        r if r < TAIL_TIER_FIRST_RANK => even_split(MID_TIER_HUNDREDTHS, mid_count),
        _ => even_split(TAIL_TIER_HUNDREDTHS, tail_count),
    }
}

fn even_split(tier_hundredths: u128, ranks: u64) -> TierShare {
    if ranks == 0 {
        return TierShare {
            percentage: 0.0,
            hundredths: 0,
        };
    }
    TierShare {
        percentage: (tier_hundredths as f64 / 100.0) / ranks as f64,
        hundredths: tier_hundredths / u128::from(ranks),
    }
}

// floor(pool * hundredths / 10_000) without forming the full product.
fn scale_by_hundredths(pool: u128, hundredths: u128) -> u128 {
    let whole = pool / PERCENT_SCALE;
    let rest = pool % PERCENT_SCALE;
    whole * hundredths + rest * hundredths / PERCENT_SCALE
}
