/// Value substituted for a DATM dimension the caller did not supply.
pub const DEFAULT_DIMENSION: f64 = 0.5;

/// Overall score at or above which a capsule grades `A`.
pub const GRADE_A_FLOOR: f64 = 0.8;

/// Overall score at or above which a capsule grades `B`.
pub const GRADE_B_FLOOR: f64 = 0.6;

/// Overall score at or above which a capsule grades `C`.
pub const GRADE_C_FLOOR: f64 = 0.4;

/// Decimal places kept when reporting an overall score.
pub const OVERALL_DECIMALS: i32 = 4;

/// Result bound applied when a search does not specify one.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Version stamped on every newly created capsule.
pub const INITIAL_VERSION: i64 = 1;
