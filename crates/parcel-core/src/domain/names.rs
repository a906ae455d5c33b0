//! Validated string tokens: worker instances, worker functions, payload types.
//!
//! `ids.rs` と同じ Phantom Type パターン。空文字・空白のみの名前は
//! 構築時に `InvalidArgument` で拒否されるため、「欠けた名前」は
//! ドメイン内部には存在しません。

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use crate::error::ParcelError;

pub trait NameMarker:
    fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + PartialOrd + Ord + Send + Sync + 'static
{
    /// Used in error messages ("worker id", "payload type", ...).
    fn describe() -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name<T: NameMarker> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T: NameMarker> Name<T> {
    /// Parse a raw token, trimming surrounding whitespace.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, ParcelError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ParcelError::invalid_argument(format!(
                "{} must not be blank",
                T::describe()
            )));
        }
        Ok(Self {
            value: trimmed.to_string(),
            _marker: PhantomData,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: NameMarker> fmt::Display for Name<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: NameMarker> TryFrom<String> for Name<T> {
    type Error = ParcelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl<T: NameMarker> From<Name<T>> for String {
    fn from(name: Name<T>) -> Self {
        name.value
    }
}

impl<T: NameMarker> Borrow<str> for Name<T> {
    fn borrow(&self) -> &str {
        &self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkerInstance {}

impl NameMarker for WorkerInstance {
    fn describe() -> &'static str {
        "worker id"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Function {}

impl NameMarker for Function {
    fn describe() -> &'static str {
        "worker function"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Payload {}

impl NameMarker for Payload {
    fn describe() -> &'static str {
        "payload type"
    }
}

/// A worker instance (e.g. `ingest-2`).
pub type WorkerId = Name<WorkerInstance>;

/// The pipeline-stage function a worker instance performs (e.g. `ingest`).
pub type WorkerFunction = Name<Function>;

/// Payload type token used for topic subscriptions (e.g. `acme.shipment.v1`).
pub type PayloadType = Name<Payload>;
