//! Record decoding: [`FieldValueMap`] → caller-chosen destination type.
//!
//! The decoder is a tolerant serde [`Deserializer`] over the row map. Destination types
//! derive [`serde::Deserialize`]; a map key binds to the field with the same serde name
//! (use `#[serde(rename = "...")]` to bind a differently named field).
//!
//! Coercions:
//!
//! - numeric text → integer and float fields (`"9"` → `9`)
//! - `true/false/t/f/1/0` (any case) → `bool` fields
//! - a list of text → sequence fields
//! - a list of objects → sequences of nested records, decoded with the same rules
//! - a single text value or object → one-element sequence
//!
//! A key absent from the map is reported as a missing field unless the destination type
//! opts into defaults with `#[serde(default)]`, which leaves the field at its zero value.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::value::{MapDeserializer, SeqDeserializer, StringDeserializer};
use serde::de::{self, DeserializeOwned, Deserializer, IntoDeserializer, Unexpected, Visitor};
use serde::forward_to_deserialize_any;
use thiserror::Error;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{FieldValue, FieldValueMap};

use super::mapper::MappedRow;

/// A row map whose shape cannot be coerced into the destination type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DecodeError {
    message: String,
}

impl de::Error for DecodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self {
            message: msg.to_string(),
        }
    }
}

/// Decode one row map into `T`.
pub fn decode_row<T: DeserializeOwned>(values: FieldValueMap) -> Result<T, DecodeError> {
    T::deserialize(Record::new(values))
}

/// Decode a [`MappedRow`], attaching its sheet and row number to any failure.
pub(crate) fn decode_mapped_row<T: DeserializeOwned>(row: MappedRow) -> IngestionResult<T> {
    decode_row(row.values).map_err(|e| IngestionError::Decode {
        sheet: row.sheet.to_string(),
        row: row.row,
        message: e.to_string(),
    })
}

/// An object whose entries are decoded by name.
struct Record<X> {
    entries: BTreeMap<String, X>,
}

impl<X> Record<X> {
    fn new(entries: BTreeMap<String, X>) -> Self {
        Self { entries }
    }
}

impl Record<Text> {
    fn from_text(entries: BTreeMap<String, String>) -> Self {
        Self::new(entries.into_iter().map(|(k, v)| (k, Text(v))).collect())
    }
}

impl<'de, X> Deserializer<'de> for Record<X>
where
    X: IntoDeserializer<'de, DecodeError>,
{
    type Error = DecodeError;

    fn deserialize_any<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        let mut map: MapDeserializer<'de, _, DecodeError> = MapDeserializer::new(self.entries.into_iter());
        let value = visitor.visit_map(&mut map)?;
        map.end()?;
        Ok(value)
    }

    fn deserialize_option<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<W: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: W,
    ) -> Result<W::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        let mut seq: SeqDeserializer<_, DecodeError> = SeqDeserializer::new(std::iter::once(self));
        let value = visitor.visit_seq(&mut seq)?;
        seq.end()?;
        Ok(value)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct tuple tuple_struct map struct enum
        identifier ignored_any
    }
}

impl<'de, X> IntoDeserializer<'de, DecodeError> for Record<X>
where
    X: IntoDeserializer<'de, DecodeError>,
{
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

/// A single cell value, parsed on demand into whatever the destination asks for.
struct Text(String);

impl Text {
    fn parse<N>(&self, expected: &'static str) -> Result<N, DecodeError>
    where
        N: FromStr,
    {
        self.0
            .trim()
            .parse::<N>()
            .map_err(|_| de::Error::invalid_value(Unexpected::Str(&self.0), &expected))
    }

    fn parse_bool(&self) -> Result<bool, DecodeError> {
        match self.0.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(de::Error::invalid_value(
                Unexpected::Str(&self.0),
                &"a boolean (true/false/t/f/1/0)",
            )),
        }
    }
}

macro_rules! parse_text_as {
    ($($method:ident => $visit:ident: $ty:ty, $expected:literal;)*) => {$(
        fn $method<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
            let value: $ty = self.parse($expected)?;
            visitor.$visit(value)
        }
    )*};
}

impl<'de> Deserializer<'de> for Text {
    type Error = DecodeError;

    fn deserialize_any<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        visitor.visit_string(self.0)
    }

    fn deserialize_bool<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        visitor.visit_bool(self.parse_bool()?)
    }

    parse_text_as! {
        deserialize_i8 => visit_i8: i8, "an 8-bit integer";
        deserialize_i16 => visit_i16: i16, "a 16-bit integer";
        deserialize_i32 => visit_i32: i32, "a 32-bit integer";
        deserialize_i64 => visit_i64: i64, "a 64-bit integer";
        deserialize_i128 => visit_i128: i128, "a 128-bit integer";
        deserialize_u8 => visit_u8: u8, "an unsigned 8-bit integer";
        deserialize_u16 => visit_u16: u16, "an unsigned 16-bit integer";
        deserialize_u32 => visit_u32: u32, "an unsigned 32-bit integer";
        deserialize_u64 => visit_u64: u64, "an unsigned 64-bit integer";
        deserialize_u128 => visit_u128: u128, "an unsigned 128-bit integer";
        deserialize_f32 => visit_f32: f32, "a number";
        deserialize_f64 => visit_f64: f64, "a number";
        deserialize_char => visit_char: char, "a single character";
    }

    fn deserialize_bytes<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        visitor.visit_byte_buf(self.0.into_bytes())
    }

    fn deserialize_byte_buf<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        visitor.visit_byte_buf(self.0.into_bytes())
    }

    fn deserialize_option<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        visitor.visit_some(self)
    }

    fn deserialize_unit<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<W: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: W,
    ) -> Result<W::Value, DecodeError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<W: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: W,
    ) -> Result<W::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        let mut seq: SeqDeserializer<_, DecodeError> = SeqDeserializer::new(std::iter::once(self));
        let value = visitor.visit_seq(&mut seq)?;
        seq.end()?;
        Ok(value)
    }

    fn deserialize_tuple<W: Visitor<'de>>(self, _len: usize, visitor: W) -> Result<W::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<W: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: W,
    ) -> Result<W::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        Err(de::Error::invalid_type(Unexpected::Str(&self.0), &visitor))
    }

    fn deserialize_struct<W: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: W,
    ) -> Result<W::Value, DecodeError> {
        Err(de::Error::invalid_type(Unexpected::Str(&self.0), &visitor))
    }

    fn deserialize_enum<W: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: W,
    ) -> Result<W::Value, DecodeError> {
        let variant: StringDeserializer<DecodeError> = self.0.trim().to_string().into_deserializer();
        visitor.visit_enum(variant)
    }

    fn deserialize_ignored_any<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        str string identifier
    }
}

impl<'de> IntoDeserializer<'de, DecodeError> for Text {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! text_or_any {
    ($($method:ident)*) => {$(
        fn $method<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
            match self {
                FieldValue::Text(text) => Text(text).$method(visitor),
                other => other.deserialize_any(visitor),
            }
        }
    )*};
}

impl<'de> Deserializer<'de> for FieldValue {
    type Error = DecodeError;

    fn deserialize_any<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        match self {
            FieldValue::Text(text) => visitor.visit_string(text),
            FieldValue::List(items) => {
                let mut seq: SeqDeserializer<_, DecodeError> =
                    SeqDeserializer::new(items.into_iter().map(Text));
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            FieldValue::Map(entries) => Record::from_text(entries).deserialize_any(visitor),
            FieldValue::MapList(objects) => {
                let mut seq: SeqDeserializer<_, DecodeError> =
                    SeqDeserializer::new(objects.into_iter().map(Record::from_text));
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
        }
    }

    text_or_any! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char deserialize_bytes
        deserialize_byte_buf deserialize_unit deserialize_ignored_any
    }

    fn deserialize_option<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<W: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: W,
    ) -> Result<W::Value, DecodeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        match self {
            FieldValue::Text(text) => Text(text).deserialize_seq(visitor),
            FieldValue::Map(entries) => Record::from_text(entries).deserialize_seq(visitor),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_tuple<W: Visitor<'de>>(self, _len: usize, visitor: W) -> Result<W::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<W: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: W,
    ) -> Result<W::Value, DecodeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<W: Visitor<'de>>(self, visitor: W) -> Result<W::Value, DecodeError> {
        match self {
            FieldValue::Map(entries) => Record::from_text(entries).deserialize_any(visitor),
            other => Err(de::Error::invalid_type(other.unexpected(), &visitor)),
        }
    }

    fn deserialize_struct<W: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: W,
    ) -> Result<W::Value, DecodeError> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<W: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: W,
    ) -> Result<W::Value, DecodeError> {
        match self {
            FieldValue::Text(text) => Text(text).deserialize_enum(name, variants, visitor),
            other => Err(de::Error::invalid_type(other.unexpected(), &visitor)),
        }
    }

    forward_to_deserialize_any! {
        str string unit_struct identifier
    }
}

impl<'de> IntoDeserializer<'de, DecodeError> for FieldValue {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

impl FieldValue {
    fn unexpected(&self) -> Unexpected<'_> {
        match self {
            FieldValue::Text(text) => Unexpected::Str(text),
            FieldValue::List(_) | FieldValue::MapList(_) => Unexpected::Seq,
            FieldValue::Map(_) => Unexpected::Map,
        }
    }
}
