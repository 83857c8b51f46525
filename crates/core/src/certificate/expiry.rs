//! Certificate expiry tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How close a certificate is to expiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CertificateStatus {
    /// Outside the warning window.
    Valid {
        /// Whole days until expiry.
        days_left: i64,
    },
    /// Inside the warning window; a new certificate should be requested.
    ExpiringSoon {
        /// Whole days until expiry.
        days_left: i64,
    },
    /// Past its validity end.
    Expired,
}

impl CertificateStatus {
    /// Classifies `not_after` against `now` and a warning window in days.
    #[must_use]
    pub fn at(not_after: DateTime<Utc>, now: DateTime<Utc>, warning_days: i64) -> Self {
        if not_after <= now {
            return Self::Expired;
        }
        let days_left = (not_after - now).num_days();
        if days_left <= warning_days {
            Self::ExpiringSoon { days_left }
        } else {
            Self::Valid { days_left }
        }
    }

    /// Returns true if the certificate can still sign.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        !matches!(self, Self::Expired)
    }
}
