//! Solidity storage layouts as emitted by the compiler (`storageLayout`).
//!
//! See <https://docs.soliditylang.org/en/latest/internals/layout_in_storage.html#json-output>.
//!
//! Several variables may share one slot at different byte offsets. Within a
//! 32-byte slot word a value occupies bytes `[offset, offset + width)` counted
//! from the low-order end.

use std::collections::BTreeMap;

use alloy_primitives::{
    B256,
    U256,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("malformed storage layout: {0}")]
    Malformed(String),
    #[error("malformed storage layout: {0}")]
    Json(#[from] serde_json::Error),
}

/// One named storage variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSlot {
    pub ast_id: u64,
    /// Declaring contract as `path/to/File.sol:Name`.
    pub contract: String,
    pub label: String,
    pub offset: u8,
    /// Decimal slot index; may exceed 64 bits.
    pub slot: String,
    #[serde(rename = "type")]
    pub type_tag: String,
}

impl StorageSlot {
    pub fn slot_index(&self) -> Result<U256, LayoutError> {
        U256::from_str_radix(&self.slot, 10).map_err(|err| {
            LayoutError::Malformed(format!(
                "slot `{}` of `{}` is not a decimal index: {err}",
                self.slot, self.label
            ))
        })
    }

    /// Extracts this variable's `width` bytes from a raw slot word.
    pub fn extract(&self, word: B256, width: usize) -> U256 {
        let shifted = U256::from_be_bytes(word.0) >> (usize::from(self.offset) * 8);
        match width {
            0 => U256::ZERO,
            1..32 => shifted & (U256::MAX >> (256 - width * 8)),
            _ => shifted,
        }
    }
}

/// Type table entry keyed by type tag, e.g. `t_uint8`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageType {
    /// `inplace`, `mapping`, `dynamic_array` or `bytes`.
    pub encoding: String,
    pub label: String,
    pub number_of_bytes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<StorageSlot>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    pub storage: Vec<StorageSlot>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub types: BTreeMap<String, StorageType>,
}

// solc emits `"types": null` for contracts without storage.
fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, StorageType>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

impl StorageLayout {
    pub fn parse(json: &str) -> Result<Self, LayoutError> {
        let layout: Self = serde_json::from_str(json)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, LayoutError> {
        let layout: Self = serde_json::from_value(value)?;
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> Result<(), LayoutError> {
        for slot in &self.storage {
            if slot.offset >= 32 {
                return Err(LayoutError::Malformed(format!(
                    "offset {} of `{}` is outside the 32-byte slot",
                    slot.offset, slot.label
                )));
            }
            slot.slot_index()?;
        }
        Ok(())
    }

    /// Exact match on label and type tag. A miss is an expected outcome when
    /// probing for variables that only some contract versions declare.
    pub fn find_slot(&self, label: &str, type_tag: &str) -> Option<&StorageSlot> {
        self.storage
            .iter()
            .find(|slot| slot.label == label && slot.type_tag == type_tag)
    }

    /// First variable with `label`, whatever its type.
    pub fn find_label(&self, label: &str) -> Option<&StorageSlot> {
        self.storage.iter().find(|slot| slot.label == label)
    }

    pub fn storage_type(&self, type_tag: &str) -> Option<&StorageType> {
        self.types.get(type_tag)
    }

    /// Width in bytes of an in-slot value of `type_tag`, capped at one word.
    ///
    /// Mappings, dynamic arrays and multi-slot values report 32: only their
    /// head word lives at the declared slot.
    pub fn type_width(&self, type_tag: &str) -> Option<usize> {
        let ty = self.types.get(type_tag)?;
        let bytes = ty.number_of_bytes.parse::<usize>().ok()?;
        Some(bytes.min(32))
    }
}
