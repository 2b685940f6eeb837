use serde::Serialize;

/// Below this magnitude a rate is treated as zero and geometric sums fall
/// back to plain counts.
pub const RATE_EPSILON: f64 = 1e-12;

pub fn monthly_rate(annual_return: f64) -> f64 {
    (1.0 + annual_return).powf(1.0 / 12.0) - 1.0
}

pub fn yearly_factor(monthly_rate: f64) -> f64 {
    (1.0 + monthly_rate).powi(12)
}

/// Effective monthly compounding derived once from an annual return and
/// reused across every step of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateModel {
    pub annual_return: f64,
    pub monthly_rate: f64,
    pub yearly_factor: f64,
}

impl RateModel {
    pub fn new(annual_return: f64) -> Self {
        let monthly = monthly_rate(annual_return);
        Self {
            annual_return,
            monthly_rate: monthly,
            yearly_factor: yearly_factor(monthly),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.monthly_rate.abs() < RATE_EPSILON
    }

    pub fn accrue_month(&self, capital: f64) -> f64 {
        capital * (1.0 + self.monthly_rate)
    }

    pub fn growth(&self, months: u32) -> f64 {
        (1.0 + self.monthly_rate).powi(months as i32)
    }

    /// Future value of 1 paid at the end of each month for `months` months.
    pub fn annuity_factor(&self, months: u32) -> f64 {
        if self.is_flat() {
            return months as f64;
        }
        (self.growth(months) - 1.0) / self.monthly_rate
    }
}
