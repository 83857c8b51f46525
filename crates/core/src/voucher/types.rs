//! Voucher type catalogue.
//!
//! A voucher type is a document kind plus its legal letter. The authority
//! identifies each combination with a numeric code; numbering is sequential
//! per (sales point, code).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of fiscal document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherKind {
    /// Invoice, the original document notes are issued against.
    Invoice,
    /// Debit note, increases the outstanding amount of an invoice.
    DebitNote,
    /// Credit note, decreases the outstanding amount of an invoice.
    CreditNote,
    /// Receipt.
    Receipt,
}

/// Legal letter, determined by the tax situation of issuer and receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Letter {
    /// Registered issuer to registered receiver.
    A,
    /// Registered issuer to final consumer or exempt receiver.
    B,
    /// Simplified-regime issuer, no VAT discriminated.
    C,
    /// Registered issuer under withholding regime.
    M,
    /// Export.
    E,
}

/// A voucher type: kind, letter and whether it is a MiPyME credit voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoucherType {
    /// Document kind.
    pub kind: VoucherKind,
    /// Legal letter.
    pub letter: Letter,
    /// MiPyME electronic credit voucher (FCE).
    pub mipyme: bool,
}

/// (code, kind, letter, mipyme)
const CATALOGUE: &[(u16, VoucherKind, Letter, bool)] = &[
    (1, VoucherKind::Invoice, Letter::A, false),
    (2, VoucherKind::DebitNote, Letter::A, false),
    (3, VoucherKind::CreditNote, Letter::A, false),
    (4, VoucherKind::Receipt, Letter::A, false),
    (6, VoucherKind::Invoice, Letter::B, false),
    (7, VoucherKind::DebitNote, Letter::B, false),
    (8, VoucherKind::CreditNote, Letter::B, false),
    (9, VoucherKind::Receipt, Letter::B, false),
    (11, VoucherKind::Invoice, Letter::C, false),
    (12, VoucherKind::DebitNote, Letter::C, false),
    (13, VoucherKind::CreditNote, Letter::C, false),
    (15, VoucherKind::Receipt, Letter::C, false),
    (19, VoucherKind::Invoice, Letter::E, false),
    (20, VoucherKind::DebitNote, Letter::E, false),
    (21, VoucherKind::CreditNote, Letter::E, false),
    (51, VoucherKind::Invoice, Letter::M, false),
    (52, VoucherKind::DebitNote, Letter::M, false),
    (53, VoucherKind::CreditNote, Letter::M, false),
    (54, VoucherKind::Receipt, Letter::M, false),
    (201, VoucherKind::Invoice, Letter::A, true),
    (202, VoucherKind::DebitNote, Letter::A, true),
    (203, VoucherKind::CreditNote, Letter::A, true),
    (206, VoucherKind::Invoice, Letter::B, true),
    (207, VoucherKind::DebitNote, Letter::B, true),
    (208, VoucherKind::CreditNote, Letter::B, true),
    (211, VoucherKind::Invoice, Letter::C, true),
    (212, VoucherKind::DebitNote, Letter::C, true),
    (213, VoucherKind::CreditNote, Letter::C, true),
];

impl VoucherType {
    /// Creates a standard (non-MiPyME) voucher type.
    #[must_use]
    pub const fn new(kind: VoucherKind, letter: Letter) -> Self {
        Self {
            kind,
            letter,
            mipyme: false,
        }
    }

    /// Creates a MiPyME credit voucher type.
    #[must_use]
    pub const fn mipyme(kind: VoucherKind, letter: Letter) -> Self {
        Self {
            kind,
            letter,
            mipyme: true,
        }
    }

    /// Looks up a type by the authority's numeric code.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        CATALOGUE
            .iter()
            .find(|(c, ..)| *c == code)
            .map(|&(_, kind, letter, mipyme)| Self {
                kind,
                letter,
                mipyme,
            })
    }

    /// The authority's numeric code, or `None` if the combination does not exist.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        CATALOGUE
            .iter()
            .find(|&&(_, kind, letter, mipyme)| {
                kind == self.kind && letter == self.letter && mipyme == self.mipyme
            })
            .map(|(code, ..)| *code)
    }

    /// Returns true for credit and debit notes.
    #[must_use]
    pub const fn is_note(&self) -> bool {
        matches!(self.kind, VoucherKind::CreditNote | VoucherKind::DebitNote)
    }

    /// Returns true if notes can be issued against this type.
    #[must_use]
    pub const fn is_referenceable(&self) -> bool {
        matches!(self.kind, VoucherKind::Invoice)
    }

    /// Returns true if the letter discriminates VAT lines.
    #[must_use]
    pub const fn discriminates_vat(&self) -> bool {
        !matches!(self.letter, Letter::C)
    }
}

impl fmt::Display for VoucherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invoice => write!(f, "invoice"),
            Self::DebitNote => write!(f, "debit-note"),
            Self::CreditNote => write!(f, "credit-note"),
            Self::Receipt => write!(f, "receipt"),
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::M => "M",
            Self::E => "E",
        };
        f.write_str(letter)
    }
}

impl fmt::Display for VoucherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mipyme {
            write!(f, "mipyme-{}-{}", self.kind, self.letter)
        } else {
            write!(f, "{}-{}", self.kind, self.letter)
        }
    }
}
