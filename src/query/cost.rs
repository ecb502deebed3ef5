
/// On-demand BigQuery price per TiB scanned, in US dollars.
pub const DEFAULT_COST_PER_TIB_USD: f64 = 5.0;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_TIB: f64 = BYTES_PER_GIB * 1024.0;

/// Projected size and price of a query, derived from a dry-run plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub bytes_processed: u64,
    pub gb_processed: f64,
    pub cost_usd: f64,
}

impl CostEstimate {
    /// Convert a dry run's `totalBytesProcessed` into gigabytes and dollars.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_bytes(bytes_processed: u64, cost_per_tib_usd: f64) -> Self {
        let bytes = bytes_processed as f64;
        Self {
            bytes_processed,
            gb_processed: bytes / BYTES_PER_GIB,
            cost_usd: bytes / BYTES_PER_TIB * cost_per_tib_usd,
        }
    }

    /// Gigabytes rounded to two decimal places for display.
    pub fn gb_display(&self) -> String {
        format!("{:.2}", self.gb_processed)
    }

    /// Dollar cost rounded to two decimal places for display.
    pub fn cost_display(&self) -> String {
        format!("{:.2}", self.cost_usd)
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Cost is always the GiB figure divided by 1024 and scaled by the rate.
        #[test]
        fn prop_cost_tracks_gigabytes(bytes in 0u64..(1u64 << 50)) {
            let est = CostEstimate::from_bytes(bytes, DEFAULT_COST_PER_TIB_USD);
            let expected = est.gb_processed / 1024.0 * DEFAULT_COST_PER_TIB_USD;
            prop_assert!((est.cost_usd - expected).abs() <= expected.abs() * 1e-12 + 1e-12);
            prop_assert!(est.gb_processed >= 0.0);
        }
    }
}
