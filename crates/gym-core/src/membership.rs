//! # Membership Rules
//!
//! Duration descriptors, end-date computation and expiry.
//!
//! ## End-Date Computation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  end = start + months  →  + 7 × weeks days  →  + days                  │
//! │                                                                         │
//! │  The order is fixed. Months are calendar months and clamp to the end   │
//! │  of a shorter month:                                                    │
//! │                                                                         │
//! │    2024-01-15 + (1, 0, 0)  = 2024-02-15                                 │
//! │    2024-01-31 + (1, 0, 0)  = 2024-02-29                                 │
//! │    2024-01-31 + (1, 1, 2)  = 2024-02-29 → 2024-03-07 → 2024-03-09       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The end date is computed once, when the membership is assigned, and is
//! stored on the instance. Later edits to the membership type never touch it.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Duration Descriptor
// =============================================================================

/// A `(months, weeks, days)` triple describing a membership type's length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DurationDescriptor {
    #[cfg_attr(feature = "sqlx", sqlx(rename = "duration_months"))]
    pub months: u32,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "duration_weeks"))]
    pub weeks: u32,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "duration_days"))]
    pub days: u32,
}

impl DurationDescriptor {
    pub const fn new(months: u32, weeks: u32, days: u32) -> Self {
        DurationDescriptor {
            months,
            weeks,
            days,
        }
    }

    pub const fn is_zero(&self) -> bool {
        self.months == 0 && self.weeks == 0 && self.days == 0
    }

    /// Fails with [`CoreError::InvalidDuration`] when every component is zero.
    pub fn validate(&self) -> CoreResult<()> {
        if self.is_zero() {
            return Err(CoreError::InvalidDuration);
        }
        Ok(())
    }

    /// Computes the end date for a membership starting on `start`.
    ///
    /// ```rust
    /// use chrono::NaiveDate;
    /// use gym_core::membership::DurationDescriptor;
    ///
    /// let d = DurationDescriptor::new(0, 2, 3);
    /// let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    /// assert_eq!(d.end_date(start).unwrap(), NaiveDate::from_ymd_opt(2024, 3, 18).unwrap());
    /// ```
    pub fn end_date(&self, start: NaiveDate) -> CoreResult<NaiveDate> {
        self.validate()?;

        let out_of_range = || CoreError::DateOutOfRange(format!("{start} + {self}"));

        let after_months = start
            .checked_add_months(Months::new(self.months))
            .ok_or_else(out_of_range)?;
        let week_days = u64::from(self.weeks) * 7;
        let after_weeks = after_months
            .checked_add_days(Days::new(week_days))
            .ok_or_else(out_of_range)?;
        after_weeks
            .checked_add_days(Days::new(u64::from(self.days)))
            .ok_or_else(out_of_range)
    }
}

impl fmt::Display for DurationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m{}w{}d", self.months, self.weeks, self.days)
    }
}

/// Moves a membership to a new start date while keeping its stored length.
///
/// The length is the number of days between the stored start and end dates,
/// so a manual edit never consults the (possibly edited) membership type.
pub fn shift_period(
    start: NaiveDate,
    end: NaiveDate,
    new_start: NaiveDate,
) -> CoreResult<NaiveDate> {
    let span = end.signed_duration_since(start);
    new_start
        .checked_add_signed(span)
        .ok_or_else(|| CoreError::DateOutOfRange(format!("{new_start} + {} days", span.num_days())))
}

// =============================================================================
// Membership Kind
// =============================================================================

/// Descriptive label carried by a membership type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MembershipKind {
    Monthly,
    Weekly,
    Yearly,
    Days,
}

impl MembershipKind {
    /// The duration a type of this kind gets when none is given.
    pub const fn default_duration(&self) -> DurationDescriptor {
        match self {
            MembershipKind::Monthly => DurationDescriptor::new(1, 0, 0),
            MembershipKind::Weekly => DurationDescriptor::new(0, 1, 0),
            MembershipKind::Yearly => DurationDescriptor::new(12, 0, 0),
            MembershipKind::Days => DurationDescriptor::new(0, 0, 1),
        }
    }
}

// =============================================================================
// Payment Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    #[default]
    Unpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
        }
    }
}

/// True when a membership ending on `end_date` no longer grants access on `today`.
///
/// The end date itself is still a valid day.
#[inline]
pub fn is_expired(end_date: NaiveDate, today: NaiveDate) -> bool {
    end_date < today
}

/// True when a paid instance must be demoted to unpaid.
#[inline]
pub fn needs_expiry_transition(status: PaymentStatus, end_date: NaiveDate, today: NaiveDate) -> bool {
    status == PaymentStatus::Paid && is_expired(end_date, today)
}

// =============================================================================
// Unit Tests
// =============================================================================
