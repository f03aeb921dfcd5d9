//! Helpers for decrypted `.xlsx` packages.
//!
//! - workbook and sheet protection (read, protect, unprotect), see [`read_protection`]
//! - Excel date-serial conversion and the zero-date fix, see [`dates`]
//!
//! Both operate on plain zip bytes. Removing a read-password is handled by `xlunlock-offcrypto`.

pub mod dates;
mod error;
mod hash;
mod package;
mod protection;
mod xml;

pub use error::ProtectionError;
pub use hash::{hash_legacy_password, PasswordHash, ProtectionHash, DEFAULT_SPIN_COUNT};
pub use protection::{
    protect_sheet, protect_workbook, read_protection, unprotect_sheet, unprotect_workbook,
    SheetProtection, SheetProtectionState, WorkbookProtection, WorkbookProtectionState,
};
