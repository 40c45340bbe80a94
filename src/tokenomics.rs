use crate::constants::BPS_DENOM;

/// Portion of collected entry fees kept by the platform.
pub fn platform_fee(total_fees: u128, platform_fee_bps: u32) -> u128 {
    total_fees - prize_pool_from_fees(total_fees, platform_fee_bps)
}

/// Portion of collected entry fees paid out to winners. The platform's cut
/// is rounded up, so pool plus fee always equals the fees collected.
pub fn prize_pool_from_fees(total_fees: u128, platform_fee_bps: u32) -> u128 {
    let denom = u128::from(BPS_DENOM);
    let pool_bps = u128::from(BPS_DENOM - platform_fee_bps.min(BPS_DENOM));
    total_fees / denom * pool_bps + total_fees % denom * pool_bps / denom
}

/// Total entry fees collected for a lobby.
pub fn total_entry_fees(entry_fee: u128, participants: u64) -> Option<u128> {
    entry_fee.checked_mul(u128::from(participants))
}

pub fn bps_to_percent(bps: u32) -> f64 {
    f64::from(bps) / 100.0
}
