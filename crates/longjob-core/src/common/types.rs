//! # Job Identifiers and Payloads
//!
//! A [`JobId`] is 128 random bits rendered as a fixed-length, lowercase
//! hexadecimal string. The fixed format lets the transport reject malformed
//! identifiers before the registry is ever consulted: [`JobId::from_str`] is
//! the only parser and accepts exactly [`JOB_ID_LEN`] characters from
//! `[0-9a-f]`.
//!
//! A [`Payload`] is the fully precomputed output of a job. It is computed once
//! at creation and never mutated, so it is stored behind an [`Arc`] and shared
//! freely between the registry and an in-flight stream.

use crate::common::error::Error;
use core::{fmt, str::FromStr};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Number of characters in the textual form of a [`JobId`].
pub const JOB_ID_LEN: usize = 32;

/// The immutable output of a job, one element per emitted unit.
pub type Payload = Arc<[char]>;

/// Opaque job identifier.
///
/// Displays as 32 lowercase hex digits, zero padded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u128);

impl JobId {
    /// Draws a fresh identifier from the thread-local RNG.
    pub fn generate() -> Self {
        Self(rand::rng().random())
    }

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u128 {
        self.0
    }

    /// Returns `true` if `s` has the canonical job id shape.
    pub fn is_well_formed(s: &str) -> bool {
        s.len() == JOB_ID_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JobId").field(&format_args!("{self}")).finish()
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_well_formed(s) {
            return Err(Error::InvalidRequest {
                reason: "Invalid jobId format.".to_string(),
            });
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| Error::InvalidRequest {
                reason: format!("Invalid jobId format: {e}"),
            })
    }
}

impl Serialize for JobId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
