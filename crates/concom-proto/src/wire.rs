//! Self-describing wire form for dynamic configuration.
//!
//! The agent cannot share in-memory structs with a plugin in another
//! process, so configuration crosses the RPC boundary as a recursive list
//! of tagged items. `encode` and `decode` are total on the
//! [`DynamicValue`] model and round-trip: `decode(encode(x)) == x` up to
//! map-key ordering, which is not semantic.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProtoError, ProtoResult};
use crate::value::{DynamicValue, Scalar, ScalarKind};

/// The wire form of one configuration mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireConfig {
    pub items: Vec<Item>,
}

/// One keyed entry of a [`WireConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: String,
    pub value: WireValue,
}

/// The four tagged alternatives an item value can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireValue {
    Scalar {
        scalar: Scalar,
    },
    ScalarList {
        kind: ScalarKind,
        scalars: Vec<Scalar>,
    },
    Config {
        config: WireConfig,
    },
    ConfigList {
        configs: Vec<WireConfig>,
    },
}

impl WireConfig {
    /// Encode a dynamic mapping into its wire form.
    pub fn encode(map: &BTreeMap<String, DynamicValue>) -> ProtoResult<Self> {
        let mut items = Vec::with_capacity(map.len());
        for (key, value) in map {
            items.push(Item {
                key: key.clone(),
                value: encode_value(value)?,
            });
        }
        Ok(Self { items })
    }

    /// Decode the wire form back into a dynamic mapping.
    ///
    /// Duplicate keys keep the last occurrence, matching the set semantics
    /// of the model.
    pub fn decode(&self) -> ProtoResult<DynamicValue> {
        let mut map = BTreeMap::new();
        for item in &self.items {
            map.insert(item.key.clone(), decode_value(&item.value)?);
        }
        Ok(DynamicValue::Map(map))
    }

    /// Parse a wire config out of a JSON value.
    ///
    /// Unknown tags fail with [`ProtoError::UnsupportedType`] rather than
    /// panicking, so a newer peer cannot crash an older one.
    pub fn from_json_value(value: serde_json::Value) -> ProtoResult<Self> {
        serde_json::from_value(value).map_err(|e| ProtoError::UnsupportedType {
            found: e.to_string(),
        })
    }

    /// Render the wire config as a JSON value for transport.
    pub fn to_json_value(&self) -> serde_json::Value {
        // Serialization of the closed variant set cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Decode the wire config straight into a concrete plugin config type.
    ///
    /// This is the generic structure decoder plugins use to rebuild their
    /// typed view of the configuration.
    pub fn decode_into<T: DeserializeOwned>(&self) -> ProtoResult<T> {
        let dynamic = self.decode()?;
        serde_json::from_value(dynamic.to_json()).map_err(|e| ProtoError::Decode {
            message: e.to_string(),
        })
    }
}

fn encode_value(value: &DynamicValue) -> ProtoResult<WireValue> {
    match value {
        DynamicValue::Scalar(scalar) => Ok(WireValue::Scalar {
            scalar: scalar.clone(),
        }),
        DynamicValue::ScalarList(scalars) => {
            let kind = scalars.first().map_or(ScalarKind::String, Scalar::kind);
            if scalars.iter().any(|s| s.kind() != kind) {
                return Err(ProtoError::UnsupportedType {
                    found: "scalar list with mixed kinds".to_string(),
                });
            }
            Ok(WireValue::ScalarList {
                kind,
                scalars: scalars.clone(),
            })
        }
        DynamicValue::Map(map) => Ok(WireValue::Config {
            config: WireConfig::encode(map)?,
        }),
        DynamicValue::MapList(maps) => {
            let configs = maps
                .iter()
                .map(WireConfig::encode)
                .collect::<ProtoResult<Vec<_>>>()?;
            Ok(WireValue::ConfigList { configs })
        }
    }
}

fn decode_value(value: &WireValue) -> ProtoResult<DynamicValue> {
    match value {
        WireValue::Scalar { scalar } => Ok(DynamicValue::Scalar(scalar.clone())),
        WireValue::ScalarList { kind, scalars } => {
            if scalars.iter().any(|s| s.kind() != *kind) {
                return Err(ProtoError::UnsupportedType {
                    found: "scalar list element disagrees with declared kind".to_string(),
                });
            }
            Ok(DynamicValue::ScalarList(scalars.clone()))
        }
        WireValue::Config { config } => config.decode(),
        WireValue::ConfigList { configs } => {
            let mut maps = Vec::with_capacity(configs.len());
            for config in configs {
                match config.decode()? {
                    DynamicValue::Map(map) => maps.push(map),
                    // decode() only ever yields a map.
                    other => {
                        return Err(ProtoError::UnsupportedType {
                            found: other.kind_name().to_string(),
                        })
                    }
                }
            }
            Ok(DynamicValue::MapList(maps))
        }
    }
}
