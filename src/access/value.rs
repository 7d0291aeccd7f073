use crate::storage::error::{StorageError, StorageResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Payload capacity of a text field. Text is stored fixed-width so that
/// every tuple of a given schema has the same byte length.
pub const TEXT_LEN: usize = 128;

/// Field types supported by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    Text,
}

impl DataType {
    /// On-disk byte width of a field of this type.
    pub fn byte_len(self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Text => 4 + TEXT_LEN,
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i32),
    Text(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Text(_) => DataType::Text,
        }
    }

    /// Writes the fixed-width encoding of this value.
    ///
    /// Ints are 4-byte little-endian. Text is a 4-byte length followed by
    /// the payload zero-padded to [`TEXT_LEN`]; oversized strings are
    /// truncated at a character boundary.
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        match self {
            Value::Int(v) => w.write_i32::<LittleEndian>(*v),
            Value::Text(s) => {
                let mut end = s.len().min(TEXT_LEN);
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                let bytes = &s.as_bytes()[..end];
                w.write_u32::<LittleEndian>(bytes.len() as u32)?;
                w.write_all(bytes)?;
                w.write_all(&vec![0u8; TEXT_LEN - bytes.len()])
            }
        }
    }

    /// Reads one value of the given type from its fixed-width encoding.
    pub fn read_from<R: Read>(r: &mut R, dtype: DataType) -> StorageResult<Value> {
        match dtype {
            DataType::Int => Ok(Value::Int(r.read_i32::<LittleEndian>()?)),
            DataType::Text => {
                let len = r.read_u32::<LittleEndian>()? as usize;
                if len > TEXT_LEN {
                    return Err(StorageError::CorruptField(format!(
                        "text length {} exceeds maximum {}",
                        len, TEXT_LEN
                    )));
                }
                let mut buf = vec![0u8; TEXT_LEN];
                r.read_exact(&mut buf)?;
                buf.truncate(len);
                let s = String::from_utf8(buf)
                    .map_err(|e| StorageError::CorruptField(e.to_string()))?;
                Ok(Value::Text(s))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: &Value) -> Value {
        let mut buf = Vec::new();
        v.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), v.data_type().byte_len());
        Value::read_from(&mut buf.as_slice(), v.data_type()).unwrap()
    }

    #[test]
    fn test_int_round_trip() {
        assert_eq!(round_trip(&Value::Int(0)), Value::Int(0));
        assert_eq!(round_trip(&Value::Int(-1)), Value::Int(-1));
        assert_eq!(round_trip(&Value::Int(i32::MAX)), Value::Int(i32::MAX));
    }

    #[test]
    fn test_text_round_trip() {
        assert_eq!(
            round_trip(&Value::Text("hello".into())),
            Value::Text("hello".into())
        );
        assert_eq!(round_trip(&Value::Text(String::new())), Value::Text(String::new()));
    }

    #[test]
    fn test_text_truncated_to_capacity() {
        let long = "x".repeat(TEXT_LEN + 40);
        let Value::Text(s) = round_trip(&Value::Text(long)) else {
            panic!("expected text");
        };
        assert_eq!(s.len(), TEXT_LEN);
    }

    #[test]
    fn test_text_truncation_respects_char_boundary() {
        // 'é' is two bytes; an odd capacity split lands mid-character
        let long = "é".repeat(TEXT_LEN);
        let Value::Text(s) = round_trip(&Value::Text(long)) else {
            panic!("expected text");
        };
        assert!(s.len() <= TEXT_LEN);
        assert!(s.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_bad_text_length_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(TEXT_LEN as u32 + 1).to_le_bytes());
        buf.extend_from_slice(&vec![0u8; TEXT_LEN]);
        let result = Value::read_from(&mut buf.as_slice(), DataType::Text);
        assert!(matches!(result, Err(StorageError::CorruptField(_))));
    }
}
