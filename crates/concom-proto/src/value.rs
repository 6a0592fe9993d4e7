//! Dynamic configuration values.
//!
//! Plugin configuration is arbitrary nested YAML on the agent side and a
//! concrete typed struct on the plugin side. `DynamicValue` is the closed
//! model in between: a scalar, a uniform list of scalars, a string-keyed
//! mapping, or a list of mappings. Map keys carry set semantics (two values
//! are equal regardless of key order) while lists stay ordered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ProtoError, ProtoResult};

/// A single typed scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    String(String),
    Int(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl Scalar {
    /// The kind tag of this scalar.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::String(_) => ScalarKind::String,
            Self::Int(_) => ScalarKind::Int,
            Self::Float(_) => ScalarKind::Float,
            Self::Double(_) => ScalarKind::Double,
            Self::Bool(_) => ScalarKind::Bool,
            Self::Bytes(_) => ScalarKind::Bytes,
        }
    }

    /// Render the scalar as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        use base64::Engine as _;
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(f64::from(*f)),
            Self::Double(d) => serde_json::Value::from(*d),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Bytes(b) => {
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
        }
    }
}

/// Discriminator for scalar kinds, used to tag uniform scalar lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    String,
    Int,
    Float,
    Double,
    Bool,
    Bytes,
}

/// A dynamic configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Scalar(Scalar),
    /// Ordered list of scalars of one uniform kind.
    ScalarList(Vec<Scalar>),
    Map(BTreeMap<String, DynamicValue>),
    /// Ordered list of mappings.
    MapList(Vec<BTreeMap<String, DynamicValue>>),
}

impl DynamicValue {
    /// An empty mapping.
    pub fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Build a `DynamicValue` from a parsed YAML document.
    ///
    /// Nulls, non-string mapping keys, tagged values, and lists that mix
    /// scalars with mappings (or mix scalar kinds) are outside the model
    /// and fail with [`ProtoError::UnsupportedType`].
    pub fn from_yaml(value: &serde_yaml::Value) -> ProtoResult<Self> {
        match value {
            serde_yaml::Value::Bool(b) => Ok(Self::Scalar(Scalar::Bool(*b))),
            serde_yaml::Value::String(s) => Ok(Self::Scalar(Scalar::String(s.clone()))),
            serde_yaml::Value::Number(n) => Ok(Self::Scalar(number_to_scalar(n)?)),
            serde_yaml::Value::Sequence(seq) => Self::from_yaml_sequence(seq),
            serde_yaml::Value::Mapping(map) => Ok(Self::Map(mapping_to_map(map)?)),
            serde_yaml::Value::Null => Err(ProtoError::UnsupportedType {
                found: "null".to_string(),
            }),
            serde_yaml::Value::Tagged(tag) => Err(ProtoError::UnsupportedType {
                found: format!("tagged value {}", tag.tag),
            }),
        }
    }

    fn from_yaml_sequence(seq: &[serde_yaml::Value]) -> ProtoResult<Self> {
        // An empty sequence has no element to infer a kind from; it becomes
        // an empty scalar list.
        if seq.is_empty() {
            return Ok(Self::ScalarList(Vec::new()));
        }

        if seq.iter().all(|v| matches!(v, serde_yaml::Value::Mapping(_))) {
            let mut maps = Vec::with_capacity(seq.len());
            for item in seq {
                if let serde_yaml::Value::Mapping(m) = item {
                    maps.push(mapping_to_map(m)?);
                }
            }
            return Ok(Self::MapList(maps));
        }

        let mut scalars = Vec::with_capacity(seq.len());
        for item in seq {
            match Self::from_yaml(item)? {
                Self::Scalar(s) => scalars.push(s),
                other => {
                    return Err(ProtoError::UnsupportedType {
                        found: format!("mixed sequence element: {}", other.kind_name()),
                    })
                }
            }
        }

        let kind = scalars[0].kind();
        if scalars.iter().any(|s| s.kind() != kind) {
            return Err(ProtoError::UnsupportedType {
                found: "scalar list with mixed kinds".to_string(),
            });
        }

        Ok(Self::ScalarList(scalars))
    }

    /// Render the value as JSON. Byte scalars become base64 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Scalar(s) => s.to_json(),
            Self::ScalarList(list) => {
                serde_json::Value::Array(list.iter().map(Scalar::to_json).collect())
            }
            Self::Map(map) => map_to_json(map),
            Self::MapList(maps) => serde_json::Value::Array(maps.iter().map(map_to_json).collect()),
        }
    }

    /// Short name of the value's shape, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::ScalarList(_) => "scalar list",
            Self::Map(_) => "map",
            Self::MapList(_) => "map list",
        }
    }

    /// Borrow the value as a mapping, if it is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, DynamicValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

fn number_to_scalar(n: &serde_yaml::Number) -> ProtoResult<Scalar> {
    if let Some(i) = n.as_i64() {
        Ok(Scalar::Int(i))
    } else if let Some(f) = n.as_f64() {
        Ok(Scalar::Double(f))
    } else {
        // u64 values beyond i64::MAX have no slot in the scalar set.
        Err(ProtoError::UnsupportedType {
            found: format!("number {}", n),
        })
    }
}

fn mapping_to_map(map: &serde_yaml::Mapping) -> ProtoResult<BTreeMap<String, DynamicValue>> {
    let mut out = BTreeMap::new();
    for (key, value) in map {
        let key = key
            .as_str()
            .ok_or_else(|| ProtoError::UnsupportedType {
                found: "non-string mapping key".to_string(),
            })?
            .to_string();
        out.insert(key, DynamicValue::from_yaml(value)?);
    }
    Ok(out)
}

fn map_to_json(map: &BTreeMap<String, DynamicValue>) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    for (key, value) in map {
        out.insert(key.clone(), value.to_json());
    }
    serde_json::Value::Object(out)
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(de)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(input: &str) -> serde_yaml::Value {
        serde_yaml::from_str(input).unwrap()
    }

    #[test]
    fn test_from_yaml_scalars() {
        let value = DynamicValue::from_yaml(&yaml("name: Chris\nage: 18\nactive: false\nprice: 12.12")).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map["name"], DynamicValue::Scalar(Scalar::String("Chris".into())));
        assert_eq!(map["age"], DynamicValue::Scalar(Scalar::Int(18)));
        assert_eq!(map["active"], DynamicValue::Scalar(Scalar::Bool(false)));
        assert_eq!(map["price"], DynamicValue::Scalar(Scalar::Double(12.12)));
    }

    #[test]
    fn test_from_yaml_nested_map() {
        let value = DynamicValue::from_yaml(&yaml("friends:\n  chris:\n    home: London")).unwrap();
        let map = value.as_map().unwrap();
        let friends = map["friends"].as_map().unwrap();
        let chris = friends["chris"].as_map().unwrap();
        assert_eq!(chris["home"], DynamicValue::Scalar(Scalar::String("London".into())));
    }

    #[test]
    fn test_from_yaml_scalar_list() {
        let value = DynamicValue::from_yaml(&yaml("friends: [Darren, Rod]")).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(
            map["friends"],
            DynamicValue::ScalarList(vec![
                Scalar::String("Darren".into()),
                Scalar::String("Rod".into())
            ])
        );
    }

    #[test]
    fn test_from_yaml_map_list() {
        let value = DynamicValue::from_yaml(&yaml("friends:\n  - name: Chris")).unwrap();
        let map = value.as_map().unwrap();
        match &map["friends"] {
            DynamicValue::MapList(maps) => {
                assert_eq!(maps.len(), 1);
                assert_eq!(maps[0]["name"], DynamicValue::Scalar(Scalar::String("Chris".into())));
            }
            other => panic!("expected map list, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_from_yaml_rejects_null() {
        let err = DynamicValue::from_yaml(&yaml("value: null")).unwrap_err();
        assert!(matches!(err, ProtoError::UnsupportedType { .. }));
    }

    #[test]
    fn test_from_yaml_rejects_mixed_list() {
        let err = DynamicValue::from_yaml(&yaml("value: [1, two]")).unwrap_err();
        assert!(matches!(err, ProtoError::UnsupportedType { .. }));
    }

    #[test]
    fn test_from_yaml_rejects_list_mixing_scalars_and_maps() {
        let err = DynamicValue::from_yaml(&yaml("value:\n  - 1\n  - name: x")).unwrap_err();
        assert!(matches!(err, ProtoError::UnsupportedType { .. }));
    }

    #[test]
    fn test_to_json_bytes_as_base64() {
        let value = DynamicValue::Scalar(Scalar::Bytes(vec![1, 2, 3]));
        assert_eq!(value.to_json(), serde_json::json!("AQID"));
    }

    #[test]
    fn test_map_equality_is_order_insensitive() {
        let a = DynamicValue::from_yaml(&yaml("x: 1\ny: 2")).unwrap();
        let b = DynamicValue::from_yaml(&yaml("y: 2\nx: 1")).unwrap();
        assert_eq!(a, b);
    }
}
