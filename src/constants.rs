/// Application constants

// Prize tiers, in hundredths of a percent
pub const PERCENT_SCALE: u128 = 10_000;
pub const TOP_TIER_HUNDREDTHS: [u128; 3] = [4_000, 2_500, 1_500]; // 40% / 25% / 15%
pub const MID_TIER_HUNDREDTHS: u128 = 1_500; // ranks 4-10 share 15%
pub const MID_TIER_MAX_RANKS: u64 = 7;
pub const TAIL_TIER_HUNDREDTHS: u128 = 500; // ranks 11+ share 5%
pub const TAIL_TIER_FIRST_RANK: u64 = 11;

// Platform fee taken from entry fees before the prize pool
pub const BPS_DENOM: u32 = 10_000;
pub const DEFAULT_PLATFORM_FEE_BPS: u32 = 1_000; // 10%

// Lobbies
pub const MAX_LOBBY_CAPACITY: i32 = 100_000;

// Teams
pub const MIN_TEAM_TOKENS: usize = 1;
pub const MAX_TEAM_TOKENS: usize = 10;

// Pagination
pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

// Largest field the prize preview endpoint will compute
pub const MAX_PREVIEW_PARTICIPANTS: u64 = 100_000;

// API version
pub const API_VERSION: &str = "v1";

// Background service intervals
pub const STATUS_SYNC_INTERVAL_SECS: u64 = 30;
pub const STATUS_SYNC_BATCH_SIZE: i64 = 500;
