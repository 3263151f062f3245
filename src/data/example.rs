//! `tf.train.Example` messages, the payload of each record.
//!
//! Only the wire layout matters here; field numbers follow `example.proto`
//! and `feature.proto`.

use std::collections::HashMap;

use prost::Message;

use crate::error::{Error, Result};

#[derive(Clone, PartialEq, Message)]
pub struct Example {
    #[prost(message, optional, tag = "1")]
    pub features: Option<Features>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Features {
    #[prost(map = "string, message", tag = "1")]
    pub feature: HashMap<String, Feature>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    #[prost(oneof = "Kind", tags = "1, 2, 3")]
    pub kind: Option<Kind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum Kind {
    #[prost(message, tag = "1")]
    BytesList(BytesList),
    #[prost(message, tag = "2")]
    FloatList(FloatList),
    #[prost(message, tag = "3")]
    Int64List(Int64List),
}

#[derive(Clone, PartialEq, Message)]
pub struct BytesList {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub value: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FloatList {
    #[prost(float, repeated, tag = "1")]
    pub value: Vec<f32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Int64List {
    #[prost(int64, repeated, tag = "1")]
    pub value: Vec<i64>,
}

impl Example {
    pub fn decode_bytes(payload: &[u8]) -> Result<Example> {
        Ok(Example::decode(payload)?)
    }

    fn kind(&self, key: &str) -> Result<&Kind> {
        self.features
            .as_ref()
            .and_then(|f| f.feature.get(key))
            .and_then(|f| f.kind.as_ref())
            .ok_or_else(|| Error::Feature { key: key.to_string(), reason: "missing".into() })
    }

    /// The first value of a `BytesList` feature.
    pub fn bytes(&self, key: &str) -> Result<&[u8]> {
        match self.kind(key)? {
            Kind::BytesList(list) => list.value.first().map(|v| v.as_slice()).ok_or_else(|| {
                Error::Feature { key: key.to_string(), reason: "empty bytes list".into() }
            }),
            _ => Err(Error::Feature { key: key.to_string(), reason: "expected a bytes list".into() }),
        }
    }

    /// The first value of an `Int64List` feature.
    pub fn int64(&self, key: &str) -> Result<i64> {
        match self.kind(key)? {
            Kind::Int64List(list) => list.value.first().copied().ok_or_else(|| {
                Error::Feature { key: key.to_string(), reason: "empty int64 list".into() }
            }),
            _ => Err(Error::Feature { key: key.to_string(), reason: "expected an int64 list".into() }),
        }
    }

    /// Builds an example with one bytes feature and one int64 feature.
    pub fn labelled_image(image_key: &str, image: Vec<u8>, label_key: &str, label: i64) -> Example {
        let mut feature = HashMap::new();
        feature.insert(
            image_key.to_string(),
            Feature { kind: Some(Kind::BytesList(BytesList { value: vec![image] })) },
        );
        feature.insert(
            label_key.to_string(),
            Feature { kind: Some(Kind::Int64List(Int64List { value: vec![label] })) },
        );
        Example { features: Some(Features { feature }) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_what_it_encodes() {
        let example = Example::labelled_image("image", vec![1, 2, 3], "label", 2);
        let decoded = Example::decode_bytes(&example.encode_to_vec()).unwrap();
        assert_eq!(decoded.bytes("image").unwrap(), &[1, 2, 3]);
        assert_eq!(decoded.int64("label").unwrap(), 2);
    }

    #[test]
    fn reports_missing_and_mistyped_features() {
        let example = Example::labelled_image("image", vec![1], "label", 0);
        assert!(matches!(example.bytes("img"), Err(Error::Feature { .. })));
        assert!(matches!(example.int64("image"), Err(Error::Feature { .. })));
        assert!(matches!(Example::default().int64("label"), Err(Error::Feature { .. })));
    }

    #[test]
    fn garbage_payload_is_a_decode_error() {
        assert!(matches!(Example::decode_bytes(&[0xff, 0xff, 0xff]), Err(Error::Decode(_))));
    }
}
