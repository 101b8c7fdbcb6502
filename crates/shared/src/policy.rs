//! Payment policy: amount bounds and reward-point tiers
//!
//! Both are configuration (`PAYMENT_MIN_AMOUNT`, `PAYMENT_MAX_AMOUNT`,
//! `PAYMENT_POINT_TIERS`) and are applied once, when a payment is created.

use crate::models::{Amount, AmountError};
use serde::Serialize;
use thiserror::Error;

/// Policy errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("amount must be between {min} and {max} (got {amount})")]
    AmountOutOfBounds {
        amount: Amount,
        min: Amount,
        max: Amount,
    },

    #[error("invalid point tier '{0}': expected <min_amount>:<points>")]
    InvalidTier(String),

    #[error("invalid tier amount: {0}")]
    InvalidTierAmount(#[from] AmountError),

    #[error("minimum amount {min} exceeds maximum amount {max}")]
    InvalidBounds { min: Amount, max: Amount },
}

/// A single tier: payments of at least `min` earn `points`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PointTier {
    pub min: Amount,
    pub points: i64,
}

/// Creation-time rules for payments
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentPolicy {
    pub min_amount: Amount,
    pub max_amount: Amount,
    /// Sorted by `min` descending
    point_tiers: Vec<PointTier>,
    pub default_currency: String,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            min_amount: Amount::from_minor(100),
            max_amount: Amount::from_minor(1_000_000),
            point_tiers: vec![
                PointTier {
                    min: Amount::from_minor(300),
                    points: 6,
                },
                PointTier {
                    min: Amount::from_minor(200),
                    points: 4,
                },
                PointTier {
                    min: Amount::from_minor(100),
                    points: 1,
                },
            ],
            default_currency: "MZN".to_string(),
        }
    }
}

impl PaymentPolicy {
    pub fn new(
        min_amount: Amount,
        max_amount: Amount,
        mut point_tiers: Vec<PointTier>,
        default_currency: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        if min_amount > max_amount {
            return Err(PolicyError::InvalidBounds {
                min: min_amount,
                max: max_amount,
            });
        }
        point_tiers.sort_by(|a, b| b.min.cmp(&a.min));
        Ok(Self {
            min_amount,
            max_amount,
            point_tiers,
            default_currency: default_currency.into(),
        })
    }

    pub fn point_tiers(&self) -> &[PointTier] {
        &self.point_tiers
    }

    /// Points earned by a payment of `amount` (highest matching tier, else 0)
    pub fn points_for(&self, amount: Amount) -> i64 {
        self.point_tiers
            .iter()
            .find(|tier| amount >= tier.min)
            .map(|tier| tier.points)
            .unwrap_or(0)
    }

    /// Check `min_amount <= amount <= max_amount`
    pub fn check_amount(&self, amount: Amount) -> Result<(), PolicyError> {
        if amount < self.min_amount || amount > self.max_amount {
            return Err(PolicyError::AmountOutOfBounds {
                amount,
                min: self.min_amount,
                max: self.max_amount,
            });
        }
        Ok(())
    }

    /// Parse a tier table such as `"3.0:6,2.0:4,1.0:1"`
    pub fn parse_tiers(raw: &str) -> Result<Vec<PointTier>, PolicyError> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|entry| {
                let (min, points) = entry
                    .split_once(':')
                    .ok_or_else(|| PolicyError::InvalidTier(entry.to_string()))?;
                let points: i64 = points
                    .trim()
                    .parse()
                    .map_err(|_| PolicyError::InvalidTier(entry.to_string()))?;
                if points < 0 {
                    return Err(PolicyError::InvalidTier(entry.to_string()));
                }
                Ok(PointTier {
                    min: min.parse()?,
                    points,
                })
            })
            .collect()
    }
}
