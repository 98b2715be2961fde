//! Identity types shared by every tier of the linker.
//!
//! `FileId` is allocated by the linker registry, local symbol ids by the
//! per-file [`SymbolTableBuilder`](crate::symbol_table::SymbolTableBuilder).
//! Together they form a [`CompositeSymbolId`], the only way symbols refer to
//! each other across files.

mod resolution;
mod symbol;

pub use resolution::{ModuleResolution, ResolutionKind};
pub use symbol::{
    Attribute, AttributeKind, ExportRecord, ImportRecord, ScopeKind, SymbolInfo, SymbolKind,
    SymbolLocation, TypeParameter,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use thiserror::Error;

/// Largest file id accepted by [`CompositeSymbolId::validate_range`].
pub const MAX_FILE_ID: u32 = 1 << 30;
/// Largest local symbol id accepted by [`CompositeSymbolId::validate_range`].
pub const MAX_LOCAL_ID: u32 = 1 << 24;

const COMPACT_BASE: u64 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(NonZeroU32);

impl FileId {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub fn value(&self) -> u32 {
        self.0.get()
    }

    /// Convert to the underlying u32 value
    pub fn to_u32(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("empty compact string")]
    EmptyCompact,

    #[error("invalid character '{ch}' in compact string")]
    InvalidCharacter { ch: char },

    #[error("compact string overflows a 64-bit id")]
    Overflow,

    #[error("encoded id has no file component")]
    MissingFile,

    #[error("file id {file_id} exceeds maximum {max}")]
    FileIdOutOfRange { file_id: u32, max: u32 },

    #[error("local symbol id {local_id} exceeds maximum {max}")]
    LocalIdOutOfRange { local_id: u32, max: u32 },
}

/// Globally unique symbol identity: the owning file plus the per-file local id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeSymbolId {
    pub file_id: FileId,
    pub local_id: u32,
}

impl CompositeSymbolId {
    pub fn new(file_id: FileId, local_id: u32) -> Self {
        Self { file_id, local_id }
    }

    /// Pack into a single integer: file id in the low 32 bits, local id above.
    pub fn encode(&self) -> u64 {
        u64::from(self.file_id.value()) | (u64::from(self.local_id) << 32)
    }

    /// Inverse of [`encode`](Self::encode). `None` when the file half is zero.
    pub fn decode(packed: u64) -> Option<Self> {
        let file_id = FileId::new((packed & 0xFFFF_FFFF) as u32)?;
        Some(Self {
            file_id,
            local_id: (packed >> 32) as u32,
        })
    }

    /// Dense base-63 text form (`A-Z`, `a-z`, `0-9`, `_`) for external APIs.
    pub fn to_compact_string(&self) -> String {
        let mut packed = self.encode();
        let mut digits = Vec::new();
        while packed > 0 {
            digits.push(digit_to_char(packed % COMPACT_BASE));
            packed /= COMPACT_BASE;
        }
        digits.iter().rev().collect()
    }

    pub fn parse_compact_string(compact: &str) -> Result<Self, IdError> {
        if compact.is_empty() {
            return Err(IdError::EmptyCompact);
        }

        let mut packed: u64 = 0;
        for ch in compact.chars() {
            let digit = char_to_digit(ch).ok_or(IdError::InvalidCharacter { ch })?;
            packed = packed
                .checked_mul(COMPACT_BASE)
                .and_then(|v| v.checked_add(digit))
                .ok_or(IdError::Overflow)?;
        }

        Self::decode(packed).ok_or(IdError::MissingFile)
    }

    pub fn validate_range(&self) -> Result<(), IdError> {
        if self.file_id.value() > MAX_FILE_ID {
            return Err(IdError::FileIdOutOfRange {
                file_id: self.file_id.value(),
                max: MAX_FILE_ID,
            });
        }
        if self.local_id > MAX_LOCAL_ID {
            return Err(IdError::LocalIdOutOfRange {
                local_id: self.local_id,
                max: MAX_LOCAL_ID,
            });
        }
        Ok(())
    }
}

impl fmt::Display for CompositeSymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol[F:{},L:{}]", self.file_id, self.local_id)
    }
}

fn digit_to_char(digit: u64) -> char {
    let digit = digit as u8;
    match digit {
        0..=25 => (b'A' + digit) as char,
        26..=51 => (b'a' + digit - 26) as char,
        52..=61 => (b'0' + digit - 52) as char,
        _ => '_',
    }
}

fn char_to_digit(ch: char) -> Option<u64> {
    let value = match ch {
        'A'..='Z' => ch as u64 - 'A' as u64,
        'a'..='z' => ch as u64 - 'a' as u64 + 26,
        '0'..='9' => ch as u64 - '0' as u64 + 52,
        '_' => 62,
        _ => return None,
    };
    Some(value)
}
