//! Binary ("rapified") encoding of a class tree.
//!
//! ```text
//! +-------------------+
//! | Magic (4 bytes)   |  "\0raP"
//! +-------------------+
//! | Version (u32 LE)  |
//! +-------------------+
//! | String table      |  varint count, then varint length + UTF-8
//! +-------------------+
//! | Root body         |
//! +-------------------+
//! ```
//!
//! A body is a varint property count and the property records,
//! followed by a varint nested-class count, one `u32` LE absolute
//! offset per nested class, and the class records those offsets point
//! at. A class record is the name index, the parent (`0` for none,
//! otherwise index + 1), a kind byte, and the class body.
//!
//! A property record is the name index, an operator byte and a value
//! record. Values start with a tag byte: string (index), float
//! (`f64` LE), integer (zigzag varint) or array (varint count and the
//! element records).
//!
//! Every name and string value is stored once in the string table.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::ast::{ClassKind, ClassNode, ClassTree, MAX_DEPTH, Operator, Property, Value};

/// Identifies a rapified class tree.
pub const MAGIC: &[u8; 4] = b"\0raP";

/// Format version written by [`encode`] and accepted by [`decode`].
pub const VERSION: u32 = 1;

const TAG_STRING: u8 = 0;
const TAG_FLOAT: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_ARRAY: u8 = 3;

/// Classifies a codec error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecErrorKind {
    BadMagic,
    UnsupportedVersion(u32),
    TruncatedInput,
    UnknownTypeTag(u8),
    StringTableIndexOutOfRange { index: u64, len: usize },
    InvalidUtf8,
    /// Varint longer than ten bytes or overflowing 64 bits.
    MalformedVarint,
    UnknownClassKind(u8),
    UnknownOperator(u8),
    /// A nested-class offset does not point at its record.
    InvalidOffset(u32),
    NestingTooDeep,
    /// Bytes left over after the root body.
    TrailingData(usize),
}

impl fmt::Display for CodecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "not a rapified class tree (bad magic)"),
            Self::UnsupportedVersion(v) => {
                write!(f, "unsupported format version {v}")
            }
            Self::TruncatedInput => write!(f, "unexpected end of input"),
            Self::UnknownTypeTag(tag) => write!(f, "unknown value tag {tag}"),
            Self::StringTableIndexOutOfRange { index, len } => {
                write!(
                    f,
                    "string index {index} out of range for table of {len}"
                )
            }
            Self::InvalidUtf8 => write!(f, "string table entry is not UTF-8"),
            Self::MalformedVarint => write!(f, "malformed varint"),
            Self::UnknownClassKind(kind) => {
                write!(f, "unknown class kind {kind}")
            }
            Self::UnknownOperator(op) => write!(f, "unknown operator {op}"),
            Self::InvalidOffset(offset) => {
                write!(f, "class offset {offset} does not match record")
            }
            Self::NestingTooDeep => {
                write!(f, "nesting deeper than {MAX_DEPTH} levels")
            }
            Self::TrailingData(n) => write!(f, "{n} trailing byte(s)"),
        }
    }
}

/// Error produced while decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at byte offset {offset}")]
pub struct CodecError {
    pub kind: CodecErrorKind,
    pub offset: usize,
}

/// Serialize a tree. Raw (unresolved) trees keep their operators and
/// class kinds; pass [`crate::Resolved::flatten`] output to store
/// effective values instead.
///
/// Any tree the parser accepts decodes back unchanged. Trees built by
/// hand with nesting past [`MAX_DEPTH`] still encode, but [`decode`]
/// rejects them.
#[must_use]
pub fn encode(tree: &ClassTree) -> Vec<u8> {
    Writer::default().encode(tree)
}

/// Deserialize a tree produced by [`encode`].
///
/// # Errors
///
/// Returns `CodecError` on the first structural problem; no partial
/// tree is returned.
pub fn decode(data: &[u8]) -> Result<ClassTree, CodecError> {
    let mut reader = Reader::new(data);
    reader.read_header()?;
    reader.read_string_table()?;
    let (properties, classes) = reader.read_body()?;
    if reader.offset != data.len() {
        return Err(reader.error(CodecErrorKind::TrailingData(data.len() - reader.offset)));
    }
    let tree = ClassTree {
        properties,
        classes,
    };
    debug!(
        bytes = data.len(),
        strings = reader.strings.len(),
        classes = tree.class_count(),
        "decoded class tree"
    );
    Ok(tree)
}

/// Decode only the class at `path` (`Outer/Inner`, case-insensitive),
/// following nested-class offsets instead of decoding its siblings.
///
/// # Errors
///
/// Returns `CodecError` if the header, string table, or any record on
/// the way is malformed.
pub fn decode_class(data: &[u8], path: &str) -> Result<Option<ClassNode>, CodecError> {
    let mut reader = Reader::new(data);
    reader.read_header()?;
    reader.read_string_table()?;

    let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
    while let Some(segment) = segments.next() {
        reader.skip_properties()?;

        let mut found = None;
        for offset in reader.read_offsets()? {
            reader.seek(offset)?;
            if reader.read_string_ref()?.eq_ignore_ascii_case(segment) {
                found = Some(offset);
                break;
            }
        }
        let Some(offset) = found else {
            return Ok(None);
        };

        reader.seek(offset)?;
        if segments.peek().is_none() {
            return reader.read_class().map(Some);
        }
        reader.enter()?;
        reader.read_class_header()?;
    }
    Ok(None)
}

#[derive(Default)]
struct Writer<'a> {
    buffer: Vec<u8>,
    strings: HashMap<&'a str, u64>,
    table: Vec<&'a str>,
}

impl<'a> Writer<'a> {
    fn encode(mut self, tree: &'a ClassTree) -> Vec<u8> {
        self.intern_body(&tree.properties, &tree.classes);

        self.buffer.extend_from_slice(MAGIC);
        self.write_u32(VERSION);

        let table = std::mem::take(&mut self.table);
        self.write_varint(table.len() as u64);
        for s in &table {
            self.write_varint(s.len() as u64);
            self.buffer.extend_from_slice(s.as_bytes());
        }

        self.write_body(&tree.properties, &tree.classes);
        debug!(
            bytes = self.buffer.len(),
            strings = table.len(),
            "encoded class tree"
        );
        self.buffer
    }

    fn intern(&mut self, s: &'a str) -> u64 {
        if let Some(&index) = self.strings.get(s) {
            return index;
        }
        let index = self.strings.len() as u64;
        self.strings.insert(s, index);
        self.table.push(s);
        index
    }

    fn intern_body(&mut self, properties: &'a [Property], classes: &'a [ClassNode]) {
        for property in properties {
            self.intern(&property.name);
            self.intern_value(&property.value);
        }
        for class in classes {
            self.intern(&class.name);
            if let Some(parent) = &class.parent {
                self.intern(parent);
            }
            self.intern_body(&class.properties, &class.classes);
        }
    }

    fn intern_value(&mut self, value: &'a Value) {
        match value {
            Value::String(s) => {
                self.intern(s);
            }
            Value::Array(items) => {
                for item in items {
                    self.intern_value(item);
                }
            }
            Value::Int(_) | Value::Float(_) => {}
        }
    }

    fn write_body(&mut self, properties: &'a [Property], classes: &'a [ClassNode]) {
        self.write_varint(properties.len() as u64);
        for property in properties {
            let name = self.intern(&property.name);
            self.write_varint(name);
            self.write_u8(operator_code(property.operator));
            self.write_value(&property.value);
        }

        self.write_varint(classes.len() as u64);
        let table_at = self.buffer.len();
        self.buffer.resize(table_at + classes.len() * 4, 0);
        for (i, class) in classes.iter().enumerate() {
            // files past 4 GiB are not representable
            let offset = u32::try_from(self.buffer.len()).unwrap_or(u32::MAX);
            let slot = table_at + i * 4;
            self.buffer[slot..slot + 4].copy_from_slice(&offset.to_le_bytes());
            self.write_class(class);
        }
    }

    fn write_class(&mut self, class: &'a ClassNode) {
        let name = self.intern(&class.name);
        self.write_varint(name);
        let parent = class.parent.as_deref().map_or(0, |p| self.intern(p) + 1);
        self.write_varint(parent);
        self.write_u8(kind_code(class.kind));
        self.write_body(&class.properties, &class.classes);
    }

    fn write_value(&mut self, value: &'a Value) {
        match value {
            Value::String(s) => {
                self.write_u8(TAG_STRING);
                let index = self.intern(s);
                self.write_varint(index);
            }
            Value::Float(x) => {
                self.write_u8(TAG_FLOAT);
                self.buffer.extend_from_slice(&x.to_le_bytes());
            }
            Value::Int(n) => {
                self.write_u8(TAG_INT);
                self.write_varint(zigzag(*n));
            }
            Value::Array(items) => {
                self.write_u8(TAG_ARRAY);
                self.write_varint(items.len() as u64);
                for item in items {
                    self.write_value(item);
                }
            }
        }
    }

    fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// LEB128: seven bits per byte, high bit set on all but the last.
    #[allow(clippy::cast_possible_truncation)]
    fn write_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buffer.push(byte);
                return;
            }
            self.buffer.push(byte | 0x80);
        }
    }
}

#[allow(clippy::cast_sign_loss)]
const fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[allow(clippy::cast_possible_wrap)]
const fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

const fn operator_code(operator: Operator) -> u8 {
    match operator {
        Operator::Set => 0,
        Operator::Append => 1,
        Operator::Subtract => 2,
    }
}

const fn kind_code(kind: ClassKind) -> u8 {
    match kind {
        ClassKind::Definition => 0,
        ClassKind::Forward => 1,
        ClassKind::Delete => 2,
    }
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
    strings: Vec<String>,
    depth: usize,
}

impl<'a> Reader<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            strings: Vec::new(),
            depth: 0,
        }
    }

    const fn error(&self, kind: CodecErrorKind) -> CodecError {
        CodecError {
            kind,
            offset: self.offset,
        }
    }

    const fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn enter(&mut self) -> Result<(), CodecError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(CodecErrorKind::NestingTooDeep));
        }
        Ok(())
    }

    const fn leave(&mut self) {
        self.depth -= 1;
    }

    fn seek(&mut self, offset: u32) -> Result<(), CodecError> {
        let target = offset as usize;
        if target > self.data.len() {
            return Err(self.error(CodecErrorKind::InvalidOffset(offset)));
        }
        self.offset = target;
        Ok(())
    }

    fn read_header(&mut self) -> Result<(), CodecError> {
        match self.data.get(..MAGIC.len()) {
            Some(magic) if magic == MAGIC => self.offset = MAGIC.len(),
            None if MAGIC.starts_with(self.data) => {
                return Err(CodecError {
                    kind: CodecErrorKind::TruncatedInput,
                    offset: self.data.len(),
                });
            }
            _ => return Err(self.error(CodecErrorKind::BadMagic)),
        }

        let at = self.offset;
        let version = self.read_u32()?;
        if version != VERSION {
            return Err(CodecError {
                kind: CodecErrorKind::UnsupportedVersion(version),
                offset: at,
            });
        }
        Ok(())
    }

    fn read_string_table(&mut self) -> Result<(), CodecError> {
        let count = self.read_len()?;
        let mut strings = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            let len = self.read_len()?;
            let at = self.offset;
            let bytes = self.read_bytes(len)?;
            let s = std::str::from_utf8(bytes).map_err(|_| CodecError {
                kind: CodecErrorKind::InvalidUtf8,
                offset: at,
            })?;
            strings.push(s.to_string());
        }
        self.strings = strings;
        Ok(())
    }

    fn read_body(&mut self) -> Result<(Vec<Property>, Vec<ClassNode>), CodecError> {
        let count = self.read_len()?;
        let mut properties = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            properties.push(self.read_property()?);
        }

        let offsets = self.read_offsets()?;
        let mut classes = Vec::with_capacity(offsets.len());
        for offset in offsets {
            if self.offset != offset as usize {
                return Err(self.error(CodecErrorKind::InvalidOffset(offset)));
            }
            classes.push(self.read_class()?);
        }
        Ok((properties, classes))
    }

    fn skip_properties(&mut self) -> Result<(), CodecError> {
        let count = self.read_len()?;
        for _ in 0..count {
            self.read_property()?;
        }
        Ok(())
    }

    fn read_offsets(&mut self) -> Result<Vec<u32>, CodecError> {
        let count = self.read_len()?;
        let len = count
            .checked_mul(4)
            .ok_or_else(|| self.error(CodecErrorKind::TruncatedInput))?;
        let bytes = self.read_bytes(len)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn read_class_header(&mut self) -> Result<(String, Option<String>, ClassKind), CodecError> {
        let name = self.read_string_ref()?;
        let parent = match self.read_varint()? {
            0 => None,
            index => Some(self.string(index - 1)?),
        };
        let at = self.offset;
        let kind = match self.read_u8()? {
            0 => ClassKind::Definition,
            1 => ClassKind::Forward,
            2 => ClassKind::Delete,
            other => {
                return Err(CodecError {
                    kind: CodecErrorKind::UnknownClassKind(other),
                    offset: at,
                });
            }
        };
        Ok((name, parent, kind))
    }

    fn read_class(&mut self) -> Result<ClassNode, CodecError> {
        self.enter()?;
        let (name, parent, kind) = self.read_class_header()?;
        let (properties, classes) = self.read_body()?;
        self.leave();
        Ok(ClassNode {
            name,
            parent,
            kind,
            properties,
            classes,
        })
    }

    fn read_property(&mut self) -> Result<Property, CodecError> {
        let name = self.read_string_ref()?;
        let at = self.offset;
        let operator = match self.read_u8()? {
            0 => Operator::Set,
            1 => Operator::Append,
            2 => Operator::Subtract,
            other => {
                return Err(CodecError {
                    kind: CodecErrorKind::UnknownOperator(other),
                    offset: at,
                });
            }
        };
        let value = self.read_value()?;
        Ok(Property {
            name,
            operator,
            value,
        })
    }

    fn read_value(&mut self) -> Result<Value, CodecError> {
        let at = self.offset;
        match self.read_u8()? {
            TAG_STRING => Ok(Value::String(self.read_string_ref()?)),
            TAG_FLOAT => {
                let bytes = self.read_bytes(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Ok(Value::Float(f64::from_le_bytes(raw)))
            }
            TAG_INT => Ok(Value::Int(unzigzag(self.read_varint()?))),
            TAG_ARRAY => {
                self.enter()?;
                let count = self.read_len()?;
                let mut items = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    items.push(self.read_value()?);
                }
                self.leave();
                Ok(Value::Array(items))
            }
            tag => Err(CodecError {
                kind: CodecErrorKind::UnknownTypeTag(tag),
                offset: at,
            }),
        }
    }

    fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        if count > self.remaining() {
            return Err(self.error(CodecErrorKind::TruncatedInput));
        }
        let bytes = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_varint(&mut self) -> Result<u64, CodecError> {
        let at = self.offset;
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.read_u8()?;
            let bits = u64::from(byte & 0x7F);
            if shift == 63 && bits > 1 {
                break;
            }
            value |= bits << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError {
            kind: CodecErrorKind::MalformedVarint,
            offset: at,
        })
    }

    /// A varint used as a count or length.
    fn read_len(&mut self) -> Result<usize, CodecError> {
        let at = self.offset;
        let value = self.read_varint()?;
        usize::try_from(value).map_err(|_| CodecError {
            kind: CodecErrorKind::MalformedVarint,
            offset: at,
        })
    }

    fn read_string_ref(&mut self) -> Result<String, CodecError> {
        let at = self.offset;
        let index = self.read_varint()?;
        self.string(index).map_err(|mut err| {
            err.offset = at;
            err
        })
    }

    fn string(&self, index: u64) -> Result<String, CodecError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.get(i))
            .cloned()
            .ok_or_else(|| {
                self.error(CodecErrorKind::StringTableIndexOutOfRange {
                    index,
                    len: self.strings.len(),
                })
            })
    }
}
