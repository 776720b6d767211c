//! Conversion of typed values into JSON documents.
//!
//! `serde_json` writes NaN and the infinities as `null`, which the schema
//! engine reads as an absent value. Saving such a document would delete the
//! stored field instead of failing, so every float is checked on the way in.

use serde::ser::{self, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum DocumentError {
    /// A float that JSON cannot represent, with its path from the root.
    #[error("non-finite number at /{}", path.join("/"))]
    NonFinite { path: Vec<String> },

    #[error("{0}")]
    Custom(String),
}

impl ser::Error for DocumentError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

/// Serialize `value` to JSON, failing on the first non-finite float.
pub(crate) fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Value, DocumentError> {
    value.serialize(&mut Walker::default())?;
    serde_json::to_value(value).map_err(|err| DocumentError::Custom(err.to_string()))
}

/// Walks a value the way `serde_json` lays it out, tracking the path.
#[derive(Default)]
struct Walker {
    path: Vec<String>,
}

impl Walker {
    fn number(&self, v: f64) -> Result<(), DocumentError> {
        if v.is_finite() {
            Ok(())
        } else {
            Err(DocumentError::NonFinite {
                path: self.path.clone(),
            })
        }
    }
}

struct Compound<'a> {
    walker: &'a mut Walker,
    index: usize,
    key: Option<String>,
    /// Enum variants nest one level under the variant name.
    variant: bool,
}

impl<'a> Compound<'a> {
    fn new(walker: &'a mut Walker, variant: bool) -> Self {
        Self {
            walker,
            index: 0,
            key: None,
            variant,
        }
    }

    fn element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), DocumentError> {
        let segment = self.index.to_string();
        self.index += 1;
        self.field(segment, value)
    }

    fn field<T: Serialize + ?Sized>(&mut self, name: String, value: &T) -> Result<(), DocumentError> {
        self.walker.path.push(name);
        value.serialize(&mut *self.walker)?;
        self.walker.path.pop();
        Ok(())
    }

    fn finish(self) -> Result<(), DocumentError> {
        if self.variant {
            self.walker.path.pop();
        }
        Ok(())
    }
}

fn map_key<T: Serialize + ?Sized>(key: &T) -> Result<String, DocumentError> {
    match serde_json::to_value(key) {
        Ok(Value::String(name)) => Ok(name),
        Ok(other) => Ok(other.to_string()),
        Err(err) => Err(DocumentError::Custom(err.to_string())),
    }
}

impl<'a> Serializer for &'a mut Walker {
    type Ok = ();
    type Error = DocumentError;
    type SerializeSeq = Compound<'a>;
    type SerializeTuple = Compound<'a>;
    type SerializeTupleStruct = Compound<'a>;
    type SerializeTupleVariant = Compound<'a>;
    type SerializeMap = Compound<'a>;
    type SerializeStruct = Compound<'a>;
    type SerializeStructVariant = Compound<'a>;

    fn serialize_bool(self, _: bool) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), DocumentError> {
        self.number(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), DocumentError> {
        self.number(v)
    }

    fn serialize_char(self, _: char) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_none(self) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), DocumentError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<(), DocumentError> {
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<(), DocumentError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), DocumentError> {
        self.path.push(variant.to_string());
        value.serialize(&mut *self)?;
        self.path.pop();
        Ok(())
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Compound<'a>, DocumentError> {
        Ok(Compound::new(self, false))
    }

    fn serialize_tuple(self, _: usize) -> Result<Compound<'a>, DocumentError> {
        Ok(Compound::new(self, false))
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Compound<'a>, DocumentError> {
        Ok(Compound::new(self, false))
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Compound<'a>, DocumentError> {
        self.path.push(variant.to_string());
        Ok(Compound::new(self, true))
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Compound<'a>, DocumentError> {
        Ok(Compound::new(self, false))
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Compound<'a>, DocumentError> {
        Ok(Compound::new(self, false))
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Compound<'a>, DocumentError> {
        self.path.push(variant.to_string());
        Ok(Compound::new(self, true))
    }
}

impl ser::SerializeSeq for Compound<'_> {
    type Ok = ();
    type Error = DocumentError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), DocumentError> {
        self.element(value)
    }

    fn end(self) -> Result<(), DocumentError> {
        self.finish()
    }
}

impl ser::SerializeTuple for Compound<'_> {
    type Ok = ();
    type Error = DocumentError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), DocumentError> {
        self.element(value)
    }

    fn end(self) -> Result<(), DocumentError> {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for Compound<'_> {
    type Ok = ();
    type Error = DocumentError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), DocumentError> {
        self.element(value)
    }

    fn end(self) -> Result<(), DocumentError> {
        self.finish()
    }
}

impl ser::SerializeTupleVariant for Compound<'_> {
    type Ok = ();
    type Error = DocumentError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), DocumentError> {
        self.element(value)
    }

    fn end(self) -> Result<(), DocumentError> {
        self.finish()
    }
}

impl ser::SerializeMap for Compound<'_> {
    type Ok = ();
    type Error = DocumentError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), DocumentError> {
        self.key = Some(map_key(key)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), DocumentError> {
        let name = self.key.take().unwrap_or_default();
        self.field(name, value)
    }

    fn end(self) -> Result<(), DocumentError> {
        self.finish()
    }
}

impl ser::SerializeStruct for Compound<'_> {
    type Ok = ();
    type Error = DocumentError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), DocumentError> {
        self.field(key.to_string(), value)
    }

    fn end(self) -> Result<(), DocumentError> {
        self.finish()
    }
}

impl ser::SerializeStructVariant for Compound<'_> {
    type Ok = ();
    type Error = DocumentError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), DocumentError> {
        self.field(key.to_string(), value)
    }

    fn end(self) -> Result<(), DocumentError> {
        self.finish()
    }
}
