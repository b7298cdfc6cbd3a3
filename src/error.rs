//! Error kinds shared across the session engine.
//!
//! Most fallible internal operations just propagate `anyhow::Result`
//! with `.context(..)` breadcrumbs, the same as the rest of the crate.
//! `HoneypotError` exists for the call sites that need to distinguish an
//! attacker-visible failure from an internal one via `downcast_ref`, the
//! same role `ShellSelectionError` plays in the daemon's attach path.
//!
//! No `Decoder` variant: the terminal byte-decoder (`term::Decoder`)
//! never reaches an unrecoverable state in this implementation — an
//! overflowing escape buffer resets to `Data` instead of erroring — so
//! the variant would never be constructed.

use std::fmt;

#[derive(Debug)]
pub enum HoneypotError {
    /// A malformed SSH packet or transport-level violation. The
    /// connection is torn down; nothing is shown to the attacker.
    Protocol(String),

    /// A submitted credential was rejected.
    AuthFailure,

    /// Shell tokenization failed (unbalanced quotes, trailing
    /// backslash, ...). Attacker sees a one-line bash-style error.
    Parse(String),

    /// A command name or vfs path could not be resolved.
    NotFound(String),
}

impl fmt::Display for HoneypotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoneypotError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            HoneypotError::AuthFailure => write!(f, "authentication failure"),
            HoneypotError::Parse(msg) => write!(f, "parse error: {}", msg),
            HoneypotError::NotFound(what) => write!(f, "not found: {}", what),
        }
    }
}

impl std::error::Error for HoneypotError {}
