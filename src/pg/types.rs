//! PostgreSQL type identifiers, descriptors and server versions.
//!
//! Reference: https://www.postgresql.org/docs/current/catalog-pg-type.html

use std::fmt;

// ============================================================================
// Type OIDs
// ============================================================================

/// PostgreSQL type object identifiers (OIDs).
///
/// These are the built-in type OIDs from PostgreSQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oid(pub i32);

impl Oid {
    // Boolean types
    pub const BOOL: Oid = Oid(16);

    // Binary data
    pub const BYTEA: Oid = Oid(17);

    // Character types
    pub const CHAR: Oid = Oid(18);
    pub const NAME: Oid = Oid(19);

    // Integer types
    pub const INT8: Oid = Oid(20);
    pub const INT2: Oid = Oid(21);
    pub const INT4: Oid = Oid(23);

    // Text types
    pub const TEXT: Oid = Oid(25);

    // OID type
    pub const OID_TYPE: Oid = Oid(26);

    // Row identifier
    pub const TID: Oid = Oid(27);

    // Floating point types
    pub const FLOAT4: Oid = Oid(700);
    pub const FLOAT8: Oid = Oid(701);

    // String types
    pub const VARCHAR: Oid = Oid(1043);
    pub const BPCHAR: Oid = Oid(1042);

    // Date/time types
    pub const DATE: Oid = Oid(1082);
    pub const TIME: Oid = Oid(1083);
    pub const TIMESTAMP: Oid = Oid(1114);
    pub const TIMESTAMPTZ: Oid = Oid(1184);
    pub const INTERVAL: Oid = Oid(1186);
    pub const TIMETZ: Oid = Oid(1266);

    // Bit strings
    pub const BIT: Oid = Oid(1560);

    // UUID
    pub const UUID: Oid = Oid(2950);

    // JSON types
    pub const JSON: Oid = Oid(114);
    pub const JSONB: Oid = Oid(3802);

    // Geometric types
    pub const POINT: Oid = Oid(600);
    pub const LSEG: Oid = Oid(601);
    pub const PATH: Oid = Oid(602);
    pub const BOX: Oid = Oid(603);
    pub const POLYGON: Oid = Oid(604);
    pub const LINE: Oid = Oid(628);
    pub const CIRCLE: Oid = Oid(718);

    // Numeric
    pub const NUMERIC: Oid = Oid(1700);

    // Array types
    pub const BOOL_ARRAY: Oid = Oid(1000);
    pub const BYTEA_ARRAY: Oid = Oid(1001);
    pub const CHAR_ARRAY: Oid = Oid(1002);
    pub const INT2_ARRAY: Oid = Oid(1005);
    pub const INT4_ARRAY: Oid = Oid(1007);
    pub const TEXT_ARRAY: Oid = Oid(1009);
    pub const BPCHAR_ARRAY: Oid = Oid(1014);
    pub const VARCHAR_ARRAY: Oid = Oid(1015);
    pub const INT8_ARRAY: Oid = Oid(1016);
    pub const FLOAT4_ARRAY: Oid = Oid(1021);
    pub const FLOAT8_ARRAY: Oid = Oid(1022);
    pub const TIMESTAMP_ARRAY: Oid = Oid(1115);
    pub const DATE_ARRAY: Oid = Oid(1182);
    pub const TIME_ARRAY: Oid = Oid(1183);
    pub const TIMESTAMPTZ_ARRAY: Oid = Oid(1185);
    pub const INTERVAL_ARRAY: Oid = Oid(1187);
    pub const NUMERIC_ARRAY: Oid = Oid(1231);
    pub const TIMETZ_ARRAY: Oid = Oid(1270);
    pub const BIT_ARRAY: Oid = Oid(1561);
    pub const UUID_ARRAY: Oid = Oid(2951);
    pub const JSON_ARRAY: Oid = Oid(199);
    pub const JSONB_ARRAY: Oid = Oid(3807);

    /// Create from raw i32 value
    #[inline]
    pub fn from_i32(oid: i32) -> Self {
        Oid(oid)
    }

    /// Get the raw i32 value
    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0
    }

    /// Canonical `pg_type.typname` for built-in OIDs.
    ///
    /// Array types use the server's `_` prefix convention. Text-like and
    /// character types collapse to the name the type bridge understands.
    pub fn type_name(self) -> Option<&'static str> {
        let name = match self {
            Oid::BOOL => "bool",
            Oid::BYTEA => "bytea",
            Oid::CHAR | Oid::BPCHAR => "bpchar",
            Oid::NAME | Oid::TEXT | Oid::VARCHAR => "varchar",
            Oid::INT2 => "int2",
            Oid::INT4 => "int4",
            Oid::INT8 => "int8",
            Oid::OID_TYPE => "oid",
            Oid::FLOAT4 => "float4",
            Oid::FLOAT8 => "float8",
            Oid::NUMERIC => "numeric",
            Oid::DATE => "date",
            Oid::TIME => "time",
            Oid::TIMETZ => "timetz",
            Oid::TIMESTAMP => "timestamp",
            Oid::TIMESTAMPTZ => "timestamptz",
            Oid::INTERVAL => "interval",
            Oid::BIT => "bit",
            Oid::UUID => "uuid",
            Oid::JSON => "json",
            Oid::JSONB => "jsonb",
            Oid::POINT => "point",
            Oid::LSEG => "lseg",
            Oid::PATH => "path",
            Oid::BOX => "box",
            Oid::POLYGON => "polygon",
            Oid::LINE => "line",
            Oid::CIRCLE => "circle",
            Oid::BOOL_ARRAY => "_bool",
            Oid::BYTEA_ARRAY => "_bytea",
            Oid::CHAR_ARRAY | Oid::BPCHAR_ARRAY => "_bpchar",
            Oid::INT2_ARRAY => "_int2",
            Oid::INT4_ARRAY => "_int4",
            Oid::INT8_ARRAY => "_int8",
            Oid::FLOAT4_ARRAY => "_float4",
            Oid::FLOAT8_ARRAY => "_float8",
            Oid::TEXT_ARRAY | Oid::VARCHAR_ARRAY => "_varchar",
            Oid::JSON_ARRAY => "_json",
            Oid::JSONB_ARRAY => "_jsonb",
            Oid::NUMERIC_ARRAY => "_numeric",
            Oid::UUID_ARRAY => "_uuid",
            Oid::DATE_ARRAY => "_date",
            Oid::TIME_ARRAY => "_time",
            Oid::TIMESTAMP_ARRAY => "_timestamp",
            Oid::TIMESTAMPTZ_ARRAY => "_timestamptz",
            Oid::INTERVAL_ARRAY => "_interval",
            Oid::TIMETZ_ARRAY => "_timetz",
            Oid::BIT_ARRAY => "_bit",
            _ => return None,
        };
        Some(name)
    }

    /// Element type of a built-in array OID.
    pub fn array_element(self) -> Option<Oid> {
        let element = match self {
            Oid::BOOL_ARRAY => Oid::BOOL,
            Oid::BYTEA_ARRAY => Oid::BYTEA,
            Oid::CHAR_ARRAY => Oid::CHAR,
            Oid::BPCHAR_ARRAY => Oid::BPCHAR,
            Oid::INT2_ARRAY => Oid::INT2,
            Oid::INT4_ARRAY => Oid::INT4,
            Oid::INT8_ARRAY => Oid::INT8,
            Oid::FLOAT4_ARRAY => Oid::FLOAT4,
            Oid::FLOAT8_ARRAY => Oid::FLOAT8,
            Oid::TEXT_ARRAY => Oid::TEXT,
            Oid::VARCHAR_ARRAY => Oid::VARCHAR,
            Oid::JSON_ARRAY => Oid::JSON,
            Oid::JSONB_ARRAY => Oid::JSONB,
            Oid::NUMERIC_ARRAY => Oid::NUMERIC,
            Oid::UUID_ARRAY => Oid::UUID,
            Oid::DATE_ARRAY => Oid::DATE,
            Oid::TIME_ARRAY => Oid::TIME,
            Oid::TIMESTAMP_ARRAY => Oid::TIMESTAMP,
            Oid::TIMESTAMPTZ_ARRAY => Oid::TIMESTAMPTZ,
            Oid::INTERVAL_ARRAY => Oid::INTERVAL,
            Oid::TIMETZ_ARRAY => Oid::TIMETZ,
            Oid::BIT_ARRAY => Oid::BIT,
            _ => return None,
        };
        Some(element)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "oid {}", self.0),
        }
    }
}

// ============================================================================
// Type Descriptors
// ============================================================================

/// Remote column type as reported by catalog introspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteTypeDescriptor {
    pub type_name: String,
    /// `atttypmod`; -1 when unspecified.
    pub type_modifier: i32,
    /// `attndims`; 0 is treated as one dimension for array types.
    pub array_dimensions: u32,
}

impl RemoteTypeDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            type_modifier: -1,
            array_dimensions: 0,
        }
    }

    /// Descriptor for a built-in OID. Unknown OIDs get a name that no table
    /// entry matches, so they resolve as cast-to-string.
    pub fn from_oid(oid: Oid, type_modifier: i32) -> Self {
        let type_name = oid
            .type_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("oid_{}", oid.as_i32()));
        Self {
            type_name,
            type_modifier,
            array_dimensions: 0,
        }
    }

    /// `numeric(width, scale)`.
    pub fn numeric(width: i32, scale: i32) -> Self {
        Self {
            type_name: "numeric".to_string(),
            type_modifier: ((width << 16) | (scale & 0x7FF)) + 4,
            array_dimensions: 0,
        }
    }

    pub fn with_modifier(mut self, type_modifier: i32) -> Self {
        self.type_modifier = type_modifier;
        self
    }

    pub fn with_array_dimensions(mut self, dims: u32) -> Self {
        self.array_dimensions = dims;
        self
    }

    /// Array types carry a leading underscore in `pg_type.typname`.
    pub fn is_array(&self) -> bool {
        self.type_name.starts_with('_')
    }

    /// Descriptor of the array element; the modifier carries over.
    pub fn element(&self) -> Option<RemoteTypeDescriptor> {
        let name = self.type_name.strip_prefix('_')?;
        Some(RemoteTypeDescriptor {
            type_name: name.to_string(),
            type_modifier: self.type_modifier,
            array_dimensions: 0,
        })
    }
}

// ============================================================================
// Server Version
// ============================================================================

/// Remote server flavor, detected from the `version()` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    Postgres,
    Unknown,
}

/// Parsed server version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub kind: ServerKind,
}

impl PgVersion {
    /// Parse a `SELECT version()` or `server_version` string.
    ///
    /// Reads up to three dot-separated numbers starting at the first digit.
    /// Servers that do not call themselves PostgreSQL are `ServerKind::Unknown`.
    pub fn parse(version: &str) -> Self {
        let kind = if version.contains("PostgreSQL") {
            ServerKind::Postgres
        } else {
            ServerKind::Unknown
        };
        let mut parts = [0u32; 3];
        let rest = version.trim_start_matches(|c: char| !c.is_ascii_digit());
        let mut chars = rest.chars().peekable();
        for part in parts.iter_mut() {
            let mut digits = String::new();
            while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(c);
                chars.next();
            }
            if digits.is_empty() {
                break;
            }
            *part = digits.parse().unwrap_or(u32::MAX);
            if chars.peek() != Some(&'.') {
                break;
            }
            chars.next();
        }
        Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            kind,
        }
    }

    pub fn is_postgres(&self) -> bool {
        self.kind == ServerKind::Postgres
    }
}

impl fmt::Display for PgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Oid::INT4.type_name(), Some("int4"));
        assert_eq!(Oid::TEXT.type_name(), Some("varchar"));
        assert_eq!(Oid::INT4_ARRAY.type_name(), Some("_int4"));
        assert_eq!(Oid(999_999).type_name(), None);
    }

    #[test]
    fn test_array_element() {
        assert_eq!(Oid::INT4_ARRAY.array_element(), Some(Oid::INT4));
        assert_eq!(Oid::INT4.array_element(), None);
    }

    #[test]
    fn test_numeric_descriptor_modifier() {
        let desc = RemoteTypeDescriptor::numeric(10, 2);
        assert_eq!(desc.type_modifier, (10 << 16) + 2 + 4);
    }

    #[test]
    fn test_descriptor_element() {
        let desc = RemoteTypeDescriptor::new("_int4").with_array_dimensions(2);
        assert!(desc.is_array());
        let elem = desc.element().unwrap();
        assert_eq!(elem.type_name, "int4");
        assert!(RemoteTypeDescriptor::new("int4").element().is_none());
    }

    #[test]
    fn test_version_parse() {
        let v = PgVersion::parse("PostgreSQL 15.4 (Debian 15.4-1.pgdg120+1) on x86_64");
        assert_eq!((v.major, v.minor, v.patch), (15, 4, 0));
        assert!(v.is_postgres());

        let v = PgVersion::parse("9.6.24");
        assert_eq!((v.major, v.minor, v.patch), (9, 6, 24));
        assert!(!v.is_postgres());

        let v = PgVersion::parse("no digits here");
        assert_eq!((v.major, v.minor, v.patch), (0, 0, 0));
    }
}
