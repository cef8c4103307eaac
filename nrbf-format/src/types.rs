//! Type tags and primitive values carried by the record stream.

use std::fmt;

/// Primitive type tag (`PrimitiveTypeEnumeration`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveType {
    Boolean = 1,
    Byte = 2,
    Char = 3,
    // 4 is unused by the format
    Decimal = 5,
    Double = 6,
    Int16 = 7,
    Int32 = 8,
    Int64 = 9,
    SByte = 10,
    Single = 11,
    TimeSpan = 12,
    DateTime = 13,
    UInt16 = 14,
    UInt32 = 15,
    UInt64 = 16,
    /// Only valid as a type tag, never as a raw value.
    Null = 17,
    /// Only valid as a type tag, never as a raw value.
    String = 18,
}

impl PrimitiveType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Boolean),
            2 => Some(Self::Byte),
            3 => Some(Self::Char),
            5 => Some(Self::Decimal),
            6 => Some(Self::Double),
            7 => Some(Self::Int16),
            8 => Some(Self::Int32),
            9 => Some(Self::Int64),
            10 => Some(Self::SByte),
            11 => Some(Self::Single),
            12 => Some(Self::TimeSpan),
            13 => Some(Self::DateTime),
            14 => Some(Self::UInt16),
            15 => Some(Self::UInt32),
            16 => Some(Self::UInt64),
            17 => Some(Self::Null),
            18 => Some(Self::String),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Whether values of this type can appear as raw bytes in the stream.
    #[inline(always)]
    pub fn has_raw_value(self) -> bool {
        !matches!(self, PrimitiveType::Null | PrimitiveType::String)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::Byte => "Byte",
            PrimitiveType::Char => "Char",
            PrimitiveType::Decimal => "Decimal",
            PrimitiveType::Double => "Double",
            PrimitiveType::Int16 => "Int16",
            PrimitiveType::Int32 => "Int32",
            PrimitiveType::Int64 => "Int64",
            PrimitiveType::SByte => "SByte",
            PrimitiveType::Single => "Single",
            PrimitiveType::TimeSpan => "TimeSpan",
            PrimitiveType::DateTime => "DateTime",
            PrimitiveType::UInt16 => "UInt16",
            PrimitiveType::UInt32 => "UInt32",
            PrimitiveType::UInt64 => "UInt64",
            PrimitiveType::Null => "Null",
            PrimitiveType::String => "String",
        };
        f.write_str(name)
    }
}

/// Member or element type tag (`BinaryTypeEnumeration`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryType {
    Primitive = 0,
    String = 1,
    Object = 2,
    SystemClass = 3,
    Class = 4,
    ObjectArray = 5,
    StringArray = 6,
    PrimitiveArray = 7,
}

impl BinaryType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Primitive),
            1 => Some(Self::String),
            2 => Some(Self::Object),
            3 => Some(Self::SystemClass),
            4 => Some(Self::Class),
            5 => Some(Self::ObjectArray),
            6 => Some(Self::StringArray),
            7 => Some(Self::PrimitiveArray),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Shape tag of a `BinaryArray` record (`BinaryArrayTypeEnumeration`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryArrayType {
    Single = 0,
    Jagged = 1,
    Rectangular = 2,
    SingleOffset = 3,
    JaggedOffset = 4,
    RectangularOffset = 5,
}

impl BinaryArrayType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Single),
            1 => Some(Self::Jagged),
            2 => Some(Self::Rectangular),
            3 => Some(Self::SingleOffset),
            4 => Some(Self::JaggedOffset),
            5 => Some(Self::RectangularOffset),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Offset variants carry explicit lower bounds after the lengths.
    #[inline(always)]
    pub fn has_lower_bounds(self) -> bool {
        matches!(
            self,
            BinaryArrayType::SingleOffset
                | BinaryArrayType::JaggedOffset
                | BinaryArrayType::RectangularOffset
        )
    }
}

/// Declared type of a class member or array element, with its additional
/// type information resolved to names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberType {
    Primitive(PrimitiveType),
    String,
    Object,
    /// A class from the core library, by full type name.
    SystemClass(String),
    /// A class from a named library.
    Class {
        name: String,
        library: String,
    },
    ObjectArray,
    StringArray,
    PrimitiveArray(PrimitiveType),
}

impl MemberType {
    pub fn binary_type(&self) -> BinaryType {
        match self {
            MemberType::Primitive(_) => BinaryType::Primitive,
            MemberType::String => BinaryType::String,
            MemberType::Object => BinaryType::Object,
            MemberType::SystemClass(_) => BinaryType::SystemClass,
            MemberType::Class { .. } => BinaryType::Class,
            MemberType::ObjectArray => BinaryType::ObjectArray,
            MemberType::StringArray => BinaryType::StringArray,
            MemberType::PrimitiveArray(_) => BinaryType::PrimitiveArray,
        }
    }

    /// True for the three array kinds.
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            MemberType::ObjectArray | MemberType::StringArray | MemberType::PrimitiveArray(_)
        )
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberType::Primitive(p) => write!(f, "{}", p),
            MemberType::String => f.write_str("String"),
            MemberType::Object => f.write_str("Object"),
            MemberType::SystemClass(name) => f.write_str(name),
            MemberType::Class { name, library } => write!(f, "{}, {}", name, library),
            MemberType::ObjectArray => f.write_str("Object[]"),
            MemberType::StringArray => f.write_str("String[]"),
            MemberType::PrimitiveArray(p) => write!(f, "{}[]", p),
        }
    }
}

/// A primitive value as it appears in the stream.
///
/// Floating point values compare by bit pattern so that graphs containing
/// NaN still compare equal to themselves.
#[derive(Debug, Clone)]
pub enum PrimitiveValue {
    Boolean(bool),
    Byte(u8),
    Char(char),
    /// Decimal in its invariant text form, e.g. `-12.50`.
    Decimal(String),
    Double(f64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    SByte(i8),
    Single(f32),
    /// Ticks of 100 nanoseconds.
    TimeSpan(i64),
    DateTime(DateTime),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
}

impl PrimitiveValue {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            PrimitiveValue::Boolean(_) => PrimitiveType::Boolean,
            PrimitiveValue::Byte(_) => PrimitiveType::Byte,
            PrimitiveValue::Char(_) => PrimitiveType::Char,
            PrimitiveValue::Decimal(_) => PrimitiveType::Decimal,
            PrimitiveValue::Double(_) => PrimitiveType::Double,
            PrimitiveValue::Int16(_) => PrimitiveType::Int16,
            PrimitiveValue::Int32(_) => PrimitiveType::Int32,
            PrimitiveValue::Int64(_) => PrimitiveType::Int64,
            PrimitiveValue::SByte(_) => PrimitiveType::SByte,
            PrimitiveValue::Single(_) => PrimitiveType::Single,
            PrimitiveValue::TimeSpan(_) => PrimitiveType::TimeSpan,
            PrimitiveValue::DateTime(_) => PrimitiveType::DateTime,
            PrimitiveValue::UInt16(_) => PrimitiveType::UInt16,
            PrimitiveValue::UInt32(_) => PrimitiveType::UInt32,
            PrimitiveValue::UInt64(_) => PrimitiveType::UInt64,
        }
    }
}

impl PartialEq for PrimitiveValue {
    fn eq(&self, other: &Self) -> bool {
        use PrimitiveValue::*;

        match (self, other) {
            (Boolean(a), Boolean(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (Int16(a), Int16(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (SByte(a), SByte(b)) => a == b,
            (Single(a), Single(b)) => a.to_bits() == b.to_bits(),
            (TimeSpan(a), TimeSpan(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (UInt16(a), UInt16(b)) => a == b,
            (UInt32(a), UInt32(b)) => a == b,
            (UInt64(a), UInt64(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveValue::Boolean(v) => write!(f, "{}", v),
            PrimitiveValue::Byte(v) => write!(f, "{}", v),
            PrimitiveValue::Char(v) => write!(f, "{:?}", v),
            PrimitiveValue::Decimal(v) => write!(f, "{}m", v),
            PrimitiveValue::Double(v) => write!(f, "{}", v),
            PrimitiveValue::Int16(v) => write!(f, "{}", v),
            PrimitiveValue::Int32(v) => write!(f, "{}", v),
            PrimitiveValue::Int64(v) => write!(f, "{}", v),
            PrimitiveValue::SByte(v) => write!(f, "{}", v),
            PrimitiveValue::Single(v) => write!(f, "{}", v),
            PrimitiveValue::TimeSpan(v) => write!(f, "{} ticks", v),
            PrimitiveValue::DateTime(v) => write!(f, "{} ticks ({:?})", v.ticks(), v.kind()),
            PrimitiveValue::UInt16(v) => write!(f, "{}", v),
            PrimitiveValue::UInt32(v) => write!(f, "{}", v),
            PrimitiveValue::UInt64(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PrimitiveValue {
                fn from(value: $ty) -> Self {
                    PrimitiveValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_primitive! {
    bool => Boolean,
    u8 => Byte,
    char => Char,
    f64 => Double,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i8 => SByte,
    f32 => Single,
    DateTime => DateTime,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
}

/// Kind bits stored in the top two bits of a serialized `DateTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeKind {
    Unspecified,
    Utc,
    Local,
    /// Local time that falls in the ambiguous daylight-saving hour.
    LocalAmbiguous,
}

/// A `DateTime` in its 64-bit wire form: 62 bits of ticks and 2 bits of kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateTime(u64);

impl DateTime {
    const TICKS_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;

    pub fn from_raw(raw: u64) -> Self {
        DateTime(raw)
    }

    pub fn new(ticks: u64, kind: DateTimeKind) -> Self {
        let bits = match kind {
            DateTimeKind::Unspecified => 0,
            DateTimeKind::Utc => 1,
            DateTimeKind::Local => 2,
            DateTimeKind::LocalAmbiguous => 3,
        };
        DateTime((ticks & Self::TICKS_MASK) | (bits << 62))
    }

    #[inline(always)]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub fn ticks(self) -> u64 {
        self.0 & Self::TICKS_MASK
    }

    pub fn kind(self) -> DateTimeKind {
        match self.0 >> 62 {
            0 => DateTimeKind::Unspecified,
            1 => DateTimeKind::Utc,
            2 => DateTimeKind::Local,
            _ => DateTimeKind::LocalAmbiguous,
        }
    }
}

/// Checks the invariant text form used for decimals: an optional minus sign,
/// digits, and at most one decimal point with digits on at least one side.
pub(crate) fn is_decimal_text(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let mut seen_digit = false;
    let mut seen_point = false;

    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_point => seen_point = true,
            _ => return false,
        }
    }

    seen_digit
}
