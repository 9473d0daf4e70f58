use sfg_common::Money;

/// One volume-discount tier: orders of at least `min_quantity` units get `percent_off` off the base unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountTier {
    pub min_quantity: u32,
    pub percent_off: u8,
}

/// A deterministic volume-discount schedule. Tiers are held sorted by descending `min_quantity` so the first
/// qualifying tier is the highest discount the quantity earns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountSchedule {
    tiers: Vec<DiscountTier>,
}

impl Default for DiscountSchedule {
    fn default() -> Self {
        Self::new(vec![
            DiscountTier { min_quantity: 50, percent_off: 20 },
            DiscountTier { min_quantity: 20, percent_off: 15 },
            DiscountTier { min_quantity: 10, percent_off: 10 },
            DiscountTier { min_quantity: 5, percent_off: 5 },
        ])
    }
}

impl DiscountSchedule {
    pub fn new(mut tiers: Vec<DiscountTier>) -> Self {
        tiers.sort_by(|a, b| b.min_quantity.cmp(&a.min_quantity).then(b.percent_off.cmp(&a.percent_off)));
        Self { tiers }
    }

    pub fn none() -> Self {
        Self { tiers: Vec::new() }
    }

    /// The percentage off that `quantity` earns. Ties resolve to the highest qualifying discount.
    pub fn percent_off(&self, quantity: u32) -> u8 {
        self.tiers.iter().find(|t| quantity >= t.min_quantity).map(|t| t.percent_off).unwrap_or(0)
    }

    /// The discounted unit price, rounded half-up to a whole currency unit.
    pub fn unit_price(&self, base: Money, quantity: u32) -> Money {
        let pct = i64::from(self.percent_off(quantity));
        Money::from((base.value() * (100 - pct) + 50) / 100)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_tier_reached_means_base_price() {
        let schedule = DiscountSchedule::default();
        assert_eq!(schedule.unit_price(Money::from(12), 2), Money::from(12));
    }

    #[test]
    fn fifteen_percent_off_twelve_rounds_to_ten() {
        let schedule = DiscountSchedule::new(vec![DiscountTier { min_quantity: 5, percent_off: 15 }]);
        // round(12 * 0.85) = round(10.2) = 10
        assert_eq!(schedule.unit_price(Money::from(12), 5), Money::from(10));
        assert_eq!(schedule.unit_price(Money::from(12), 5) * 5, Money::from(50));
    }

    #[test]
    fn highest_qualifying_tier_wins() {
        let schedule = DiscountSchedule::new(vec![
            DiscountTier { min_quantity: 5, percent_off: 5 },
            DiscountTier { min_quantity: 10, percent_off: 10 },
        ]);
        assert_eq!(schedule.percent_off(4), 0);
        assert_eq!(schedule.percent_off(5), 5);
        assert_eq!(schedule.percent_off(10), 10);
        assert_eq!(schedule.percent_off(50), 10);
    }

    #[test]
    fn equal_thresholds_resolve_to_the_larger_discount() {
        let schedule = DiscountSchedule::new(vec![
            DiscountTier { min_quantity: 10, percent_off: 5 },
            DiscountTier { min_quantity: 10, percent_off: 12 },
        ]);
        assert_eq!(schedule.percent_off(10), 12);
    }

    #[test]
    fn rounding_is_half_up() {
        let schedule = DiscountSchedule::new(vec![DiscountTier { min_quantity: 1, percent_off: 50 }]);
        // 25 * 0.5 = 12.5 rounds to 13
        assert_eq!(schedule.unit_price(Money::from(25), 1), Money::from(13));
    }
}
