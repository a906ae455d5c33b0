use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::ids::UnitOfWorkId;
use super::names::PayloadType;
use crate::error::ParcelError;

/// Payload は payload type トークンと型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Shipment {
///     sequence: u64,
/// }
///
/// impl Payload for Shipment {
///     const TYPE: &'static str = "acme.shipment.v1";
/// }
/// ```
///
/// # 命名規約
/// - `{namespace}.{domain}.v{major}`
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;
}

/// PayloadType + Payload (+ UnitOfWorkId) の“運搬用”データ。
///
/// The core never interprets `payload`; only the identifier and the type are
/// inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOfWork {
    id: UnitOfWorkId,
    payload_type: PayloadType,
    payload: serde_json::Value,
}

impl UnitOfWork {
    pub fn new(id: UnitOfWorkId, payload_type: PayloadType, payload: serde_json::Value) -> Self {
        Self {
            id,
            payload_type,
            payload,
        }
    }

    /// Build from a typed payload.
    pub fn from_payload<P: Payload>(id: UnitOfWorkId, payload: &P) -> Result<Self, ParcelError> {
        let payload_type = PayloadType::parse(P::TYPE)?;
        let payload = serde_json::to_value(payload)
            .map_err(|e| ParcelError::invalid_argument(format!("payload encode: {e}")))?;
        Ok(Self::new(id, payload_type, payload))
    }

    /// Decode into a typed payload; the type token must match.
    pub fn decode<P: Payload>(&self) -> Result<P, ParcelError> {
        if self.payload_type.as_str() != P::TYPE {
            return Err(ParcelError::invalid_argument(format!(
                "payload type mismatch: expected {}, got {}",
                P::TYPE,
                self.payload_type
            )));
        }
        serde_json::from_value(self.payload.clone())
            .map_err(|e| ParcelError::invalid_argument(format!("payload decode: {e}")))
    }

    pub fn id(&self) -> UnitOfWorkId {
        self.id
    }

    pub fn payload_type(&self) -> &PayloadType {
        &self.payload_type
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn reference(&self) -> UnitOfWorkRef {
        UnitOfWorkRef {
            id: self.id,
            payload_type: self.payload_type.clone(),
        }
    }
}

/// What a parcel remembers about its unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfWorkRef {
    pub id: UnitOfWorkId,
    pub payload_type: PayloadType,
}
