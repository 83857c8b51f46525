//! Sequence resolution for voucher numbers.
//!
//! Numbers are strictly sequential per (company, sales point, voucher type).
//! The next number is derived from three sources: the authority's last
//! authorized number, the highest number stored locally, and the company's
//! reservation counter. The highest one wins.
//!
//! Numbers handed out ahead of time are forecasts. The authority only
//! accepts `remote_last + 1`, so a submission always claims that number
//! when the authority is reachable and pulls the counter back to it.

#[cfg(test)]
mod props;

use facturo_shared::types::CompanyId;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::voucher::{VoucherError, VoucherType, validate_sales_point};

/// Identifies one independent numbering sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceKey {
    /// Issuing company.
    pub company_id: CompanyId,
    /// Sales point (1..=9999).
    pub sales_point: u16,
    /// Voucher type.
    pub voucher_type: VoucherType,
}

impl SequenceKey {
    /// Builds a key, checking the sales point range and type code.
    ///
    /// # Errors
    ///
    /// Returns an error for sales points outside 1..=9999 or voucher types
    /// the authority has no code for.
    pub fn new(
        company_id: CompanyId,
        sales_point: u32,
        voucher_type: VoucherType,
    ) -> Result<Self, VoucherError> {
        let sales_point = validate_sales_point(sales_point)?;
        if voucher_type.code().is_none() {
            return Err(VoucherError::UnknownVoucherType(voucher_type.to_string()));
        }
        Ok(Self {
            company_id,
            sales_point,
            voucher_type,
        })
    }

    /// The authority's code for the voucher type, zero if unknown.
    #[must_use]
    pub fn type_code(&self) -> u16 {
        self.voucher_type.code().unwrap_or_default()
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{:04}/{}",
            self.company_id, self.sales_point, self.voucher_type
        )
    }
}

/// Which source determined a reserved number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberSource {
    /// The authority's last authorized number.
    Remote,
    /// Highest number stored in the local voucher ledger.
    Ledger,
    /// The reservation counter.
    Counter,
    /// Nothing issued yet; the sequence starts at 1.
    None,
}

/// Last numbers known to each source. `None` means the source has nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NumberSources {
    /// Last number authorized remotely.
    pub remote_last: Option<u64>,
    /// Highest authorized number stored locally.
    pub local_last: Option<u64>,
    /// Last number handed out by the reservation counter.
    pub counter_last: Option<u64>,
    /// Highest number held by a submission whose outcome is unknown.
    #[serde(default)]
    pub pending_last: Option<u64>,
}

impl NumberSources {
    /// Highest known number across all sources.
    #[must_use]
    pub fn last(&self) -> u64 {
        [
            self.remote_last,
            self.local_last,
            self.counter_last,
            self.pending_last,
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0)
    }

    /// The next number: `max(remote, local, counter) + 1`.
    #[must_use]
    pub fn next(&self) -> u64 {
        self.last() + 1
    }

    /// The source that determined `last()`. Ties favour the authority, then
    /// the ledger.
    #[must_use]
    pub fn dominant(&self) -> NumberSource {
        let last = self.last();
        if last == 0 {
            NumberSource::None
        } else if self.remote_last == Some(last) {
            NumberSource::Remote
        } else if self.local_last == Some(last) || self.pending_last == Some(last) {
            NumberSource::Ledger
        } else {
            NumberSource::Counter
        }
    }

    /// Local state ran ahead of the authority.
    ///
    /// Happens after a lost response whose voucher was in fact authorized,
    /// or after a released reservation was not rolled back.
    #[must_use]
    pub fn local_ahead_of_remote(&self) -> bool {
        let local = [self.local_last, self.counter_last, self.pending_last]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(0);
        local > self.remote_last.unwrap_or(0)
    }

    /// The number an authorization request must carry.
    ///
    /// With the authority reachable this is `remote_last + 1` whatever the
    /// counter says: counter values above it were never submitted. Without
    /// it, falls back to `next()`.
    #[must_use]
    pub fn submission_number(&self) -> u64 {
        self.remote_last.map_or_else(|| self.next(), |remote| remote + 1)
    }
}

/// A number reserved for one authorization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Sequence the number belongs to.
    pub key: SequenceKey,
    /// The reserved number.
    pub number: u64,
    /// Source values observed when reserving.
    pub sources: NumberSources,
}

impl Reservation {
    /// Reserves `sources.next()` for `key`.
    #[must_use]
    pub fn from_sources(key: SequenceKey, sources: NumberSources) -> Self {
        Self {
            key,
            number: sources.next(),
            sources,
        }
    }

    /// Claims `sources.submission_number()` for an authorization request.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNumber` when a locally authorized voucher already
    /// holds that number, meaning the authority is behind the ledger.
    pub fn for_submission(key: SequenceKey, sources: NumberSources) -> Result<Self, VoucherError> {
        let number = sources.submission_number();
        if sources.local_last >= Some(number) {
            return Err(VoucherError::DuplicateNumber {
                voucher_type: key.type_code(),
                sales_point: key.sales_point,
                number,
            });
        }
        Ok(Self {
            key,
            number,
            sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voucher::{Letter, VoucherKind};
    use rstest::rstest;

    fn key() -> SequenceKey {
        SequenceKey::new(
            CompanyId::new(),
            1,
            VoucherType::new(VoucherKind::Invoice, Letter::B),
        )
        .unwrap()
    }

    #[rstest]
    #[case(None, None, None, 1, NumberSource::None)]
    #[case(Some(41), None, None, 42, NumberSource::Remote)]
    #[case(Some(41), Some(41), Some(41), 42, NumberSource::Remote)]
    #[case(Some(40), Some(41), None, 42, NumberSource::Ledger)]
    #[case(Some(40), Some(40), Some(43), 44, NumberSource::Counter)]
    #[case(Some(0), None, None, 1, NumberSource::None)]
    fn test_next_number(
        #[case] remote_last: Option<u64>,
        #[case] local_last: Option<u64>,
        #[case] counter_last: Option<u64>,
        #[case] expected: u64,
        #[case] source: NumberSource,
    ) {
        let sources = NumberSources {
            remote_last,
            local_last,
            counter_last,
            pending_last: None,
        };
        assert_eq!(sources.next(), expected);
        assert_eq!(sources.dominant(), source);
    }

    #[test]
    fn test_local_ahead_of_remote() {
        let sources = NumberSources {
            remote_last: Some(10),
            local_last: Some(10),
            counter_last: Some(11),
            pending_last: None,
        };
        assert!(sources.local_ahead_of_remote());

        let in_sync = NumberSources {
            remote_last: Some(11),
            local_last: Some(11),
            counter_last: Some(11),
            pending_last: None,
        };
        assert!(!in_sync.local_ahead_of_remote());

        let in_flight = NumberSources {
            pending_last: Some(12),
            ..in_sync
        };
        assert!(in_flight.local_ahead_of_remote());
        assert_eq!(in_flight.dominant(), NumberSource::Ledger);
    }

    #[rstest]
    #[case(Some(41), None, Some(42), 42)]
    #[case(Some(41), Some(41), Some(45), 42)]
    #[case(None, Some(7), Some(9), 10)]
    #[case(None, None, None, 1)]
    fn test_submission_number_ignores_forecasts(
        #[case] remote_last: Option<u64>,
        #[case] local_last: Option<u64>,
        #[case] counter_last: Option<u64>,
        #[case] expected: u64,
    ) {
        let sources = NumberSources {
            remote_last,
            local_last,
            counter_last,
            pending_last: None,
        };
        assert_eq!(sources.submission_number(), expected);

        let reservation = Reservation::for_submission(key(), sources).unwrap();
        assert_eq!(reservation.number, expected);
    }

    #[test]
    fn test_submission_refuses_number_held_locally() {
        let key = key();
        let err = Reservation::for_submission(
            key,
            NumberSources {
                remote_last: Some(41),
                local_last: Some(43),
                ..NumberSources::default()
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            VoucherError::DuplicateNumber {
                voucher_type: key.type_code(),
                sales_point: 1,
                number: 42,
            }
        );
    }

    #[test]
    fn test_key_rejects_bad_sales_point() {
        let invoice = VoucherType::new(VoucherKind::Invoice, Letter::A);
        assert_eq!(
            SequenceKey::new(CompanyId::new(), 0, invoice),
            Err(VoucherError::InvalidSalesPoint(0))
        );
        assert_eq!(
            SequenceKey::new(CompanyId::new(), 10_000, invoice),
            Err(VoucherError::InvalidSalesPoint(10_000))
        );
    }

    #[test]
    fn test_key_rejects_unknown_type() {
        let receipt_e = VoucherType::new(VoucherKind::Receipt, Letter::E);
        assert!(matches!(
            SequenceKey::new(CompanyId::new(), 1, receipt_e),
            Err(VoucherError::UnknownVoucherType(_))
        ));
    }

    #[test]
    fn test_reservation_takes_next() {
        let key = key();
        let reservation = Reservation::from_sources(
            key,
            NumberSources {
                remote_last: Some(41),
                ..NumberSources::default()
            },
        );
        assert_eq!(reservation.number, 42);
        assert_eq!(reservation.key, key);
    }
}
