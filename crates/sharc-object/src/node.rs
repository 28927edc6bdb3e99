use crate::error::{ObjectError, ObjectResult};

/// Index of a node within an [`ObjectHeap`](crate::heap::ObjectHeap).
///
/// References are arena offsets, not machine addresses. A serialized graph
/// carries these indices on the wire and a decoding process rebuilds the
/// same shape in its own heap, so no pointer relocation is ever needed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub(crate) u32);

impl ObjectRef {
    /// Position of the referenced node in its heap.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        ObjectRef(index as u32)
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// The kind of an object node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    None,
    Bool,
    Int,
    Float,
    Bytes,
    Str,
    Tuple,
    FrozenSet,
    Code,
    Function,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Bytes => write!(f, "bytes"),
            Self::Str => write!(f, "str"),
            Self::Tuple => write!(f, "tuple"),
            Self::FrozenSet => write!(f, "frozenset"),
            Self::Code => write!(f, "code"),
            Self::Function => write!(f, "function"),
        }
    }
}

/// Sign-magnitude integer of arbitrary precision.
///
/// The magnitude is stored as little-endian base-2^32 digits with no
/// trailing zero digit. Zero is the empty digit vector with `negative`
/// unset. This is the exact shape the wire format carries, so canonical
/// form here means canonical bytes there.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IntValue {
    negative: bool,
    digits: Vec<u32>,
}

impl IntValue {
    pub fn zero() -> Self {
        Self { negative: false, digits: Vec::new() }
    }

    pub fn from_u64(value: u64) -> Self {
        let mut digits = vec![value as u32, (value >> 32) as u32];
        while digits.last() == Some(&0) {
            digits.pop();
        }
        Self { negative: false, digits }
    }

    pub fn from_i64(value: i64) -> Self {
        let mut out = Self::from_u64(value.unsigned_abs());
        out.negative = value < 0;
        out
    }

    /// Build from raw sign and digits, rejecting non-canonical forms.
    pub fn from_parts(negative: bool, digits: Vec<u32>) -> ObjectResult<Self> {
        if digits.last() == Some(&0) {
            return Err(ObjectError::NonCanonicalInt {
                reason: "trailing zero digit".into(),
            });
        }
        if negative && digits.is_empty() {
            return Err(ObjectError::NonCanonicalInt {
                reason: "negative zero".into(),
            });
        }
        Ok(Self { negative, digits })
    }

    /// Parse a decimal literal, with an optional leading minus sign.
    pub fn from_decimal(text: &str) -> ObjectResult<Self> {
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ObjectError::InvalidInt { text: text.into() });
        }
        let mut digits: Vec<u32> = Vec::new();
        let bytes = body.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            // consume up to 9 decimal digits per multiply-accumulate step
            let take = (bytes.len() - pos).min(9);
            let mut chunk: u32 = 0;
            for &b in &bytes[pos..pos + take] {
                chunk = chunk * 10 + (b - b'0') as u32;
            }
            mul_add(&mut digits, 10u32.pow(take as u32), chunk);
            pos += take;
        }
        Ok(Self { negative: negative && !digits.is_empty(), digits })
    }

    pub fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Little-endian base-2^32 magnitude digits.
    pub fn digits(&self) -> &[u32] {
        &self.digits
    }

    /// The value as an `i64`, if it fits.
    pub fn to_i64(&self) -> Option<i64> {
        let magnitude = match self.digits.len() {
            0 => 0u64,
            1 => self.digits[0] as u64,
            2 => (self.digits[0] as u64) | ((self.digits[1] as u64) << 32),
            _ => return None,
        };
        if self.negative {
            if magnitude <= 1u64 << 63 {
                Some(0i64.wrapping_sub_unsigned(magnitude))
            } else {
                None
            }
        } else {
            i64::try_from(magnitude).ok()
        }
    }

    /// Render as a decimal string.
    pub fn to_decimal(&self) -> String {
        if self.is_zero() {
            return "0".into();
        }
        // peel off base-10^9 chunks, least significant first
        let mut digits = self.digits.clone();
        let mut chunks: Vec<u32> = Vec::new();
        while !digits.is_empty() {
            let mut rem: u64 = 0;
            for d in digits.iter_mut().rev() {
                let cur = (rem << 32) | *d as u64;
                *d = (cur / 1_000_000_000) as u32;
                rem = cur % 1_000_000_000;
            }
            while digits.last() == Some(&0) {
                digits.pop();
            }
            chunks.push(rem as u32);
        }
        let mut out = String::new();
        if self.negative {
            out.push('-');
        }
        let mut rest = chunks.iter().rev();
        if let Some(first) = rest.next() {
            out.push_str(&first.to_string());
        }
        for chunk in rest {
            out.push_str(&format!("{chunk:09}"));
        }
        out
    }
}

fn mul_add(digits: &mut Vec<u32>, mul: u32, add: u32) {
    let mut carry = add as u64;
    for d in digits.iter_mut() {
        let cur = (*d as u64) * (mul as u64) + carry;
        *d = cur as u32;
        carry = cur >> 32;
    }
    while carry > 0 {
        digits.push(carry as u32);
        carry >>= 32;
    }
}

/// Compiled module code.
///
/// Pool fields hold heap references rather than inline values, so a code
/// object and everything it closes over serialize as a single graph with
/// shared substructure preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeObject {
    /// Simple name (`Str`).
    pub name: ObjectRef,
    /// Dotted qualified name (`Str`).
    pub qualname: ObjectRef,
    /// Source file the code was compiled from (`Str`).
    pub filename: ObjectRef,
    pub arg_count: u32,
    pub posonly_arg_count: u32,
    pub kwonly_arg_count: u32,
    pub local_count: u32,
    pub stack_size: u32,
    pub flags: u32,
    pub first_line: u32,
    /// Constant pool (`Tuple`).
    pub consts: ObjectRef,
    /// Global names referenced by the code (`Tuple` of `Str`).
    pub names: ObjectRef,
    /// Local variable names (`Tuple` of `Str`).
    pub varnames: ObjectRef,
    /// Names captured from an enclosing scope (`Tuple` of `Str`).
    pub freevars: ObjectRef,
    /// Names captured by nested scopes (`Tuple` of `Str`).
    pub cellvars: ObjectRef,
    /// Instruction stream (`Bytes`).
    pub instructions: ObjectRef,
    /// Line number table (`Bytes`).
    pub line_table: ObjectRef,
    /// Exception handling table (`Bytes`).
    pub exception_table: ObjectRef,
}

impl CodeObject {
    /// Pool fields in canonical field order.
    ///
    /// Serialization, hashing, and equality all traverse this array, so the
    /// field order is fixed here in one place.
    pub fn pool_refs(&self) -> [ObjectRef; 11] {
        [
            self.name,
            self.qualname,
            self.filename,
            self.consts,
            self.names,
            self.varnames,
            self.freevars,
            self.cellvars,
            self.instructions,
            self.line_table,
            self.exception_table,
        ]
    }

    /// Scalar fields in canonical field order.
    pub fn scalars(&self) -> [u32; 7] {
        [
            self.arg_count,
            self.posonly_arg_count,
            self.kwonly_arg_count,
            self.local_count,
            self.stack_size,
            self.flags,
            self.first_line,
        ]
    }
}

/// A live function: code plus captured environment.
///
/// Functions exist only in process memory. They are never serializable
/// because the captured environment is process state, not a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionObject {
    pub code: ObjectRef,
    pub captured: Vec<ObjectRef>,
}

/// A single immutable value in an [`ObjectHeap`](crate::heap::ObjectHeap).
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectNode {
    None,
    Bool(bool),
    Int(IntValue),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    /// Fixed-length sequence of references.
    Tuple(Vec<ObjectRef>),
    /// Immutable set. Elements are unique by structural equality and stored
    /// in insertion order; observable iteration order is a hashing concern,
    /// not a storage one.
    FrozenSet(Vec<ObjectRef>),
    Code(CodeObject),
    Function(FunctionObject),
}

impl ObjectNode {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::None => ObjectKind::None,
            Self::Bool(_) => ObjectKind::Bool,
            Self::Int(_) => ObjectKind::Int,
            Self::Float(_) => ObjectKind::Float,
            Self::Bytes(_) => ObjectKind::Bytes,
            Self::Str(_) => ObjectKind::Str,
            Self::Tuple(_) => ObjectKind::Tuple,
            Self::FrozenSet(_) => ObjectKind::FrozenSet,
            Self::Code(_) => ObjectKind::Code,
            Self::Function(_) => ObjectKind::Function,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[ObjectRef]> {
        match self {
            Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<&CodeObject> {
        match self {
            Self::Code(code) => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_from_i64_roundtrip() {
        for v in [0i64, 1, -1, 42, -42, i64::MAX, i64::MIN, 1 << 32, -(1 << 40)] {
            let iv = IntValue::from_i64(v);
            assert_eq!(iv.to_i64(), Some(v), "roundtrip failed for {v}");
        }
    }

    #[test]
    fn int_zero_is_canonical() {
        let z = IntValue::from_i64(0);
        assert!(z.is_zero());
        assert!(!z.is_negative());
        assert!(z.digits().is_empty());
    }

    #[test]
    fn int_min_magnitude_uses_two_digits() {
        let iv = IntValue::from_i64(i64::MIN);
        assert_eq!(iv.digits().len(), 2);
        assert!(iv.is_negative());
    }

    #[test]
    fn int_from_parts_rejects_trailing_zero() {
        let err = IntValue::from_parts(false, vec![7, 0]).unwrap_err();
        assert!(matches!(err, ObjectError::NonCanonicalInt { .. }));
    }

    #[test]
    fn int_from_parts_rejects_negative_zero() {
        let err = IntValue::from_parts(true, vec![]).unwrap_err();
        assert!(matches!(err, ObjectError::NonCanonicalInt { .. }));
    }

    #[test]
    fn int_decimal_small() {
        assert_eq!(IntValue::from_i64(0).to_decimal(), "0");
        assert_eq!(IntValue::from_i64(-7).to_decimal(), "-7");
        assert_eq!(IntValue::from_i64(1_000_000_007).to_decimal(), "1000000007");
    }

    #[test]
    fn int_decimal_roundtrip_large() {
        let text = "123456789012345678901234567890123456789";
        let iv = IntValue::from_decimal(text).unwrap();
        assert!(iv.digits().len() > 2);
        assert_eq!(iv.to_decimal(), text);

        let neg = IntValue::from_decimal("-99999999999999999999").unwrap();
        assert_eq!(neg.to_decimal(), "-99999999999999999999");
    }

    #[test]
    fn int_decimal_rejects_garbage() {
        assert!(IntValue::from_decimal("").is_err());
        assert!(IntValue::from_decimal("-").is_err());
        assert!(IntValue::from_decimal("12x3").is_err());
    }

    #[test]
    fn int_decimal_negative_zero_normalizes() {
        let iv = IntValue::from_decimal("-0").unwrap();
        assert!(iv.is_zero());
        assert!(!iv.is_negative());
    }

    #[test]
    fn int_power_of_two_boundary() {
        let iv = IntValue::from_decimal("18446744073709551616").unwrap(); // 2^64
        assert_eq!(iv.digits(), &[0, 0, 1]);
        assert_eq!(iv.to_i64(), None);
        assert_eq!(iv.to_decimal(), "18446744073709551616");
    }

    #[test]
    fn kind_display() {
        assert_eq!(ObjectNode::None.kind().to_string(), "none");
        assert_eq!(
            ObjectNode::FrozenSet(vec![]).kind().to_string(),
            "frozenset"
        );
        assert_eq!(
            ObjectNode::Function(FunctionObject { code: ObjectRef(0), captured: vec![] })
                .kind()
                .to_string(),
            "function"
        );
    }
}
