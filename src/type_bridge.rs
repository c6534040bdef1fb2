//! Mapping between remote column types and host logical types.
//!
//! A remote column resolves to a [`ResolvedType`]: the host logical type
//! plus a [`TypeAnnotation`] tree of the same shape carrying decode hints
//! the logical type cannot express (a VARCHAR that is really `bpchar`, a
//! DOUBLE that is really an out-of-range `numeric`, ...). Both trees are
//! built together by [`resolve_type`].
//!
//! Resolution never fails. Anything unrecognized becomes a VARCHAR column
//! annotated [`TypeHint::CastToVarchar`]; the scan query then asks the server
//! for the text form of that column.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::warn;

use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::logical::LogicalType;
use crate::pg::{Oid, RemoteTypeDescriptor};

// ============================================================================
// Annotations
// ============================================================================

/// Decode hint attached to one node of a resolved type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypeHint {
    #[default]
    None,
    /// `char(n)`/`bpchar`: strip the blank padding.
    FixedLengthChar,
    /// `jsonb`: binary values carry a leading version byte.
    Jsonb,
    /// Unknown to the host; the server renders it as text.
    CastToVarchar,
    /// `numeric` without a usable precision, read as a double.
    NumericAsDouble,
    /// Physical row identifier `(page, offset)` packed into a BIGINT.
    Ctid,
    GeomPoint,
    GeomLine,
    GeomLineSegment,
    GeomBox,
    GeomPath,
    GeomPolygon,
    GeomCircle,
    /// PostGIS `geometry`, carried as raw WKB bytes.
    Wkb,
}

impl TypeHint {
    pub fn is_geometry(self) -> bool {
        matches!(
            self,
            TypeHint::GeomPoint
                | TypeHint::GeomLine
                | TypeHint::GeomLineSegment
                | TypeHint::GeomBox
                | TypeHint::GeomPath
                | TypeHint::GeomPolygon
                | TypeHint::GeomCircle
        )
    }
}

/// Annotation tree paralleling a [`LogicalType`].
///
/// LIST nodes have exactly one child, STRUCT nodes one child per field,
/// everything else none.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeAnnotation {
    pub hint: TypeHint,
    pub children: Vec<TypeAnnotation>,
}

impl TypeAnnotation {
    /// Hint-free annotation with the same shape as `ty`.
    pub fn empty_for(ty: &LogicalType) -> Self {
        Self::hinted(ty, TypeHint::None)
    }

    /// Annotation with `hint` at the root and no hints below.
    pub fn hinted(ty: &LogicalType, hint: TypeHint) -> Self {
        let children = match ty {
            LogicalType::List(child) => vec![Self::empty_for(child)],
            LogicalType::Struct { fields, .. } => {
                fields.iter().map(|(_, t)| Self::empty_for(t)).collect()
            }
            _ => Vec::new(),
        };
        Self { hint, children }
    }

    fn list(child: TypeAnnotation) -> Self {
        Self {
            hint: TypeHint::None,
            children: vec![child],
        }
    }

    /// Whether this tree has the same LIST/STRUCT nesting as `ty`.
    pub fn matches_shape(&self, ty: &LogicalType) -> bool {
        match ty {
            LogicalType::List(child) => {
                self.children.len() == 1 && self.children[0].matches_shape(child)
            }
            LogicalType::Struct { fields, .. } => {
                self.children.len() == fields.len()
                    && self
                        .children
                        .iter()
                        .zip(fields)
                        .all(|(a, (_, t))| a.matches_shape(t))
            }
            _ => self.children.is_empty(),
        }
    }
}

/// A host logical type with its decode annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    pub logical_type: LogicalType,
    pub annotation: TypeAnnotation,
}

impl ResolvedType {
    pub fn new(logical_type: LogicalType, annotation: TypeAnnotation) -> Self {
        debug_assert!(annotation.matches_shape(&logical_type));
        Self {
            logical_type,
            annotation,
        }
    }

    pub fn plain(logical_type: LogicalType) -> Self {
        let annotation = TypeAnnotation::empty_for(&logical_type);
        Self {
            logical_type,
            annotation,
        }
    }

    pub fn hinted(logical_type: LogicalType, hint: TypeHint) -> Self {
        let annotation = TypeAnnotation::hinted(&logical_type, hint);
        Self {
            logical_type,
            annotation,
        }
    }

    /// The `ctid` pseudo column.
    pub fn row_id() -> Self {
        Self::hinted(LogicalType::BigInt, TypeHint::Ctid)
    }

    pub fn hint(&self) -> TypeHint {
        self.annotation.hint
    }

    fn cast_to_varchar() -> Self {
        Self::hinted(LogicalType::Varchar, TypeHint::CastToVarchar)
    }

    /// Remote DDL spelling. Same as [`type_to_sql`] except where the
    /// annotation names the remote type, as for PostGIS geometry.
    pub fn to_sql(&self) -> Result<String> {
        match self.wkb_depth() {
            Some(depth) => Ok(format!("GEOMETRY{}", "[]".repeat(depth))),
            None => type_to_sql(&self.logical_type),
        }
    }

    /// Remote type descriptor, see [`ResolvedType::to_sql`].
    pub fn to_remote_descriptor(&self) -> Result<RemoteTypeDescriptor> {
        match self.wkb_depth() {
            Some(0) => Ok(RemoteTypeDescriptor::new("geometry")),
            Some(depth) => {
                Ok(RemoteTypeDescriptor::new("_geometry").with_array_dimensions(depth as u32))
            }
            None => to_remote_descriptor(&self.logical_type),
        }
    }

    /// List depth above a WKB element, if the element is one.
    fn wkb_depth(&self) -> Option<usize> {
        let mut ty = &self.logical_type;
        let mut annotation = &self.annotation;
        let mut depth = 0;
        loop {
            match ty {
                LogicalType::List(child) => {
                    annotation = annotation.children.first()?;
                    ty = child;
                    depth += 1;
                }
                LogicalType::Blob if annotation.hint == TypeHint::Wkb => return Some(depth),
                _ => return None,
            }
        }
    }
}

// ============================================================================
// Lookup
// ============================================================================

/// Resolves custom (enum/composite) type names.
pub trait TypeLookup {
    fn lookup(&self, type_name: &str) -> Option<ResolvedType>;
}

impl<F> TypeLookup for F
where
    F: Fn(&str) -> Option<ResolvedType>,
{
    fn lookup(&self, type_name: &str) -> Option<ResolvedType> {
        self(type_name)
    }
}

/// Options that change how types resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Read arrays as their text literal.
    pub array_as_varchar: bool,
}

impl From<&ScanConfig> for ResolveOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            array_as_varchar: config.array_as_varchar,
        }
    }
}

/// Registered custom types, keyed by remote type name.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    entries: RwLock<HashMap<String, ResolvedType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, resolved: ResolvedType) {
        self.entries.write().insert(name.into(), resolved);
    }

    /// Register an enum by its labels in declaration order.
    pub fn register_enum<I, S>(&self, name: &str, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Arc<[String]> = labels.into_iter().map(Into::into).collect();
        self.register(
            name,
            ResolvedType::plain(LogicalType::Enum {
                name: Some(name.to_string()),
                labels,
            }),
        );
    }

    /// Register a composite type. Field types resolve against this registry,
    /// so nested composites must be registered first.
    pub fn register_composite(
        &self,
        name: &str,
        fields: &[(String, RemoteTypeDescriptor)],
        options: &ResolveOptions,
    ) {
        let mut logical_fields = Vec::with_capacity(fields.len());
        let mut children = Vec::with_capacity(fields.len());
        for (field_name, desc) in fields {
            let resolved = resolve_type(desc, Some(self), options);
            logical_fields.push((field_name.clone(), resolved.logical_type));
            children.push(resolved.annotation);
        }
        self.register(
            name,
            ResolvedType::new(
                LogicalType::Struct {
                    name: Some(name.to_string()),
                    fields: logical_fields,
                },
                TypeAnnotation {
                    hint: TypeHint::None,
                    children,
                },
            ),
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl TypeLookup for TypeRegistry {
    fn lookup(&self, type_name: &str) -> Option<ResolvedType> {
        self.entries.read().get(type_name).cloned()
    }
}

// ============================================================================
// Remote -> Host
// ============================================================================

fn point_type() -> LogicalType {
    LogicalType::struct_of([("x", LogicalType::Double), ("y", LogicalType::Double)])
}

/// Built-in scalar type names. `numeric` is handled separately.
static SCALAR_TYPES: Lazy<HashMap<&'static str, ResolvedType>> = Lazy::new(|| {
    let double_list = || LogicalType::list(LogicalType::Double);
    let entries = [
        ("bool", ResolvedType::plain(LogicalType::Boolean)),
        ("int2", ResolvedType::plain(LogicalType::SmallInt)),
        ("int4", ResolvedType::plain(LogicalType::Integer)),
        ("int8", ResolvedType::plain(LogicalType::BigInt)),
        // "The oid type is currently implemented as an unsigned four-byte integer."
        ("oid", ResolvedType::plain(LogicalType::UInteger)),
        ("float4", ResolvedType::plain(LogicalType::Float)),
        ("float8", ResolvedType::plain(LogicalType::Double)),
        ("char", ResolvedType::hinted(LogicalType::Varchar, TypeHint::FixedLengthChar)),
        ("bpchar", ResolvedType::hinted(LogicalType::Varchar, TypeHint::FixedLengthChar)),
        ("varchar", ResolvedType::plain(LogicalType::Varchar)),
        ("text", ResolvedType::plain(LogicalType::Varchar)),
        ("json", ResolvedType::plain(LogicalType::Varchar)),
        ("jsonb", ResolvedType::hinted(LogicalType::Varchar, TypeHint::Jsonb)),
        ("date", ResolvedType::plain(LogicalType::Date)),
        ("bytea", ResolvedType::plain(LogicalType::Blob)),
        ("time", ResolvedType::plain(LogicalType::Time)),
        ("timetz", ResolvedType::plain(LogicalType::TimeTz)),
        ("timestamp", ResolvedType::plain(LogicalType::Timestamp)),
        ("timestamptz", ResolvedType::plain(LogicalType::TimestampTz)),
        ("interval", ResolvedType::plain(LogicalType::Interval)),
        ("uuid", ResolvedType::plain(LogicalType::Uuid)),
        ("point", ResolvedType::hinted(point_type(), TypeHint::GeomPoint)),
        ("line", ResolvedType::hinted(double_list(), TypeHint::GeomLine)),
        ("lseg", ResolvedType::hinted(double_list(), TypeHint::GeomLineSegment)),
        ("box", ResolvedType::hinted(double_list(), TypeHint::GeomBox)),
        ("path", ResolvedType::hinted(double_list(), TypeHint::GeomPath)),
        ("polygon", ResolvedType::hinted(double_list(), TypeHint::GeomPolygon)),
        ("circle", ResolvedType::hinted(double_list(), TypeHint::GeomCircle)),
        ("geometry", ResolvedType::hinted(LogicalType::Blob, TypeHint::Wkb)),
    ];
    entries.into_iter().collect()
});

/// Names in the built-in scalar table, `numeric` included.
pub fn scalar_type_names() -> Vec<&'static str> {
    let mut names: Vec<_> = SCALAR_TYPES.keys().copied().collect();
    names.push("numeric");
    names.sort_unstable();
    names
}

/// Decode `numeric(width, scale)` from a type modifier.
///
/// Returns `None` when the column must be read as a double instead: no
/// modifier, or a precision the host decimal cannot hold.
pub fn decimal_from_modifier(type_modifier: i32) -> Option<(u8, u8)> {
    if type_modifier == -1 {
        return None;
    }
    let raw = type_modifier.wrapping_sub(4);
    let width = (raw >> 16) & 0xFFFF;
    let scale = ((raw & 0x7FF) ^ 1024) - 1024;
    if width < 0 || scale < 0 || width > LogicalType::MAX_DECIMAL_WIDTH as i32 || scale > width {
        return None;
    }
    Some((width as u8, scale as u8))
}

/// Resolve a remote column type.
pub fn resolve_type(
    desc: &RemoteTypeDescriptor,
    lookup: Option<&dyn TypeLookup>,
    options: &ResolveOptions,
) -> ResolvedType {
    if let Some(element) = desc.element() {
        if options.array_as_varchar {
            return ResolvedType::cast_to_varchar();
        }
        let dimensions = desc.array_dimensions.max(1);
        let mut resolved = resolve_type(&element, lookup, options);
        for _ in 0..dimensions {
            resolved = ResolvedType {
                logical_type: LogicalType::list(resolved.logical_type),
                annotation: TypeAnnotation::list(resolved.annotation),
            };
        }
        return resolved;
    }

    let name = desc.type_name.as_str();
    if name == "numeric" {
        return match decimal_from_modifier(desc.type_modifier) {
            Some((width, scale)) => ResolvedType::plain(LogicalType::decimal(width, scale)),
            None => ResolvedType::hinted(LogicalType::Double, TypeHint::NumericAsDouble),
        };
    }
    if let Some(resolved) = SCALAR_TYPES.get(name) {
        return resolved.clone();
    }
    if let Some(resolved) = lookup.and_then(|l| l.lookup(name)) {
        return resolved;
    }
    warn!(type_name = name, "unsupported remote type, reading as VARCHAR");
    ResolvedType::cast_to_varchar()
}

// ============================================================================
// Host -> Remote
// ============================================================================

/// Closest host type the remote side can store.
///
/// Total: unsigned integers widen, HUGEINT degrades to DOUBLE, and anything
/// without a remote counterpart becomes VARCHAR.
pub fn to_remote_type(ty: &LogicalType) -> LogicalType {
    match ty {
        LogicalType::Boolean
        | LogicalType::SmallInt
        | LogicalType::Integer
        | LogicalType::BigInt
        | LogicalType::Float
        | LogicalType::Double
        | LogicalType::Enum { .. }
        | LogicalType::Blob
        | LogicalType::Date
        | LogicalType::Decimal { .. }
        | LogicalType::Interval
        | LogicalType::Time
        | LogicalType::TimeTz
        | LogicalType::Timestamp
        | LogicalType::TimestampTz
        | LogicalType::Uuid
        | LogicalType::Varchar => ty.clone(),
        LogicalType::List(child) => LogicalType::list(to_remote_type(child)),
        LogicalType::Struct { name, fields } => LogicalType::Struct {
            name: name.clone(),
            fields: fields
                .iter()
                .map(|(n, t)| (n.clone(), to_remote_type(t)))
                .collect(),
        },
        LogicalType::TimestampSec | LogicalType::TimestampMs | LogicalType::TimestampNs => {
            LogicalType::Timestamp
        }
        LogicalType::TinyInt => LogicalType::SmallInt,
        LogicalType::UTinyInt | LogicalType::USmallInt | LogicalType::UInteger => {
            LogicalType::BigInt
        }
        LogicalType::UBigInt => LogicalType::decimal(20, 0),
        LogicalType::HugeInt => LogicalType::Double,
        _ => LogicalType::Varchar,
    }
}

/// Remote DDL spelling of a host type.
pub fn type_to_sql(ty: &LogicalType) -> Result<String> {
    match ty {
        LogicalType::Enum { name: Some(name), .. } | LogicalType::Struct { name: Some(name), .. } => {
            Ok(name.clone())
        }
        LogicalType::Float => Ok("REAL".to_string()),
        LogicalType::Double => Ok("FLOAT".to_string()),
        LogicalType::Blob => Ok("BYTEA".to_string()),
        LogicalType::List(child) => Ok(format!("{}[]", type_to_sql(child)?)),
        LogicalType::Enum { name: None, .. } => Err(ScanError::Unsupported(
            "enums must be named on the remote side; create the type with CREATE TYPE first"
                .to_string(),
        )),
        LogicalType::Struct { name: None, .. } => Err(ScanError::Unsupported(
            "composite types must be named on the remote side; create the type with CREATE TYPE first"
                .to_string(),
        )),
        LogicalType::Map(..) => Err(ScanError::Unsupported(
            "MAP has no remote counterpart".to_string(),
        )),
        LogicalType::Union(_) => Err(ScanError::Unsupported(
            "UNION has no remote counterpart".to_string(),
        )),
        other => Ok(other.to_string()),
    }
}

/// Remote type descriptor for a host type, after [`to_remote_type`].
pub fn to_remote_descriptor(ty: &LogicalType) -> Result<RemoteTypeDescriptor> {
    let remote = to_remote_type(ty);
    let depth = remote.list_depth();
    let mut element = &remote;
    while let LogicalType::List(child) = element {
        element = child;
    }
    let mut desc = match element {
        LogicalType::Decimal { width, scale } => {
            RemoteTypeDescriptor::numeric(*width as i32, *scale as i32)
        }
        LogicalType::Enum { name: Some(name), .. } | LogicalType::Struct { name: Some(name), .. } => {
            RemoteTypeDescriptor::new(name.clone())
        }
        other => {
            let name = match other {
                LogicalType::Boolean => "bool",
                LogicalType::SmallInt => "int2",
                LogicalType::Integer => "int4",
                LogicalType::BigInt => "int8",
                LogicalType::Float => "float4",
                LogicalType::Double => "float8",
                LogicalType::Varchar => "varchar",
                LogicalType::Blob => "bytea",
                LogicalType::Date => "date",
                LogicalType::Time => "time",
                LogicalType::TimeTz => "timetz",
                LogicalType::Timestamp => "timestamp",
                LogicalType::TimestampTz => "timestamptz",
                LogicalType::Interval => "interval",
                LogicalType::Uuid => "uuid",
                _ => {
                    return Err(ScanError::Unsupported(format!(
                        "no remote type name for {}",
                        other
                    )))
                }
            };
            RemoteTypeDescriptor::new(name)
        }
    };
    if depth > 0 {
        desc.type_name = format!("_{}", desc.type_name);
        desc.array_dimensions = depth as u32;
    }
    Ok(desc)
}

/// Remote OID for a host type; lists map to their element's OID.
pub fn to_remote_oid(ty: &LogicalType) -> Result<Oid> {
    let oid = match ty {
        LogicalType::Boolean => Oid::BOOL,
        LogicalType::SmallInt => Oid::INT2,
        LogicalType::Integer => Oid::INT4,
        LogicalType::BigInt => Oid::INT8,
        LogicalType::Float => Oid::FLOAT4,
        LogicalType::Double => Oid::FLOAT8,
        LogicalType::Varchar => Oid::VARCHAR,
        LogicalType::Blob => Oid::BYTEA,
        LogicalType::Date => Oid::DATE,
        LogicalType::Time => Oid::TIME,
        LogicalType::Timestamp => Oid::TIMESTAMP,
        LogicalType::Interval => Oid::INTERVAL,
        LogicalType::TimeTz => Oid::TIMETZ,
        LogicalType::TimestampTz => Oid::TIMESTAMPTZ,
        LogicalType::Bit => Oid::BIT,
        LogicalType::Uuid => Oid::UUID,
        LogicalType::List(child) => return to_remote_oid(child),
        other => {
            return Err(ScanError::Unsupported(format!(
                "no remote OID for {}",
                other
            )))
        }
    };
    Ok(oid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(name: &str) -> ResolvedType {
        resolve_type(
            &RemoteTypeDescriptor::new(name),
            None,
            &ResolveOptions::default(),
        )
    }

    #[test]
    fn test_scalar_table() {
        assert_eq!(resolve("int4").logical_type, LogicalType::Integer);
        assert_eq!(resolve("oid").logical_type, LogicalType::UInteger);
        let bpchar = resolve("bpchar");
        assert_eq!(bpchar.logical_type, LogicalType::Varchar);
        assert_eq!(bpchar.hint(), TypeHint::FixedLengthChar);
        assert_eq!(resolve("jsonb").hint(), TypeHint::Jsonb);
        assert_eq!(resolve("json").hint(), TypeHint::None);
    }

    #[test]
    fn test_unknown_degrades_to_varchar() {
        let r = resolve("hstore");
        assert_eq!(r.logical_type, LogicalType::Varchar);
        assert_eq!(r.hint(), TypeHint::CastToVarchar);
    }

    #[test]
    fn test_numeric_modifier() {
        let r = resolve_type(
            &RemoteTypeDescriptor::numeric(18, 3),
            None,
            &ResolveOptions::default(),
        );
        assert_eq!(r.logical_type, LogicalType::decimal(18, 3));

        let unbounded = resolve("numeric");
        assert_eq!(unbounded.logical_type, LogicalType::Double);
        assert_eq!(unbounded.hint(), TypeHint::NumericAsDouble);

        assert_eq!(decimal_from_modifier(RemoteTypeDescriptor::numeric(39, 0).type_modifier), None);
        assert_eq!(decimal_from_modifier(RemoteTypeDescriptor::numeric(38, 38).type_modifier), Some((38, 38)));
        // negative scale, allowed by newer servers
        assert_eq!(decimal_from_modifier(RemoteTypeDescriptor::numeric(5, -2).type_modifier), None);
    }

    #[test]
    fn test_array_dimensions() {
        let desc = RemoteTypeDescriptor::new("_int4").with_array_dimensions(2);
        let r = resolve_type(&desc, None, &ResolveOptions::default());
        assert_eq!(
            r.logical_type,
            LogicalType::list(LogicalType::list(LogicalType::Integer))
        );
        assert!(r.annotation.matches_shape(&r.logical_type));

        // zero dimensions still means one level
        let r = resolve("_text");
        assert_eq!(r.logical_type, LogicalType::list(LogicalType::Varchar));

        let opts = ResolveOptions {
            array_as_varchar: true,
        };
        let r = resolve_type(&desc, None, &opts);
        assert_eq!(r.logical_type, LogicalType::Varchar);
        assert_eq!(r.hint(), TypeHint::CastToVarchar);
    }

    #[test]
    fn test_array_element_annotation_preserved() {
        let r = resolve("_bpchar");
        assert_eq!(r.annotation.hint, TypeHint::None);
        assert_eq!(r.annotation.children[0].hint, TypeHint::FixedLengthChar);
    }

    #[test]
    fn test_geometry() {
        let point = resolve("point");
        assert_eq!(point.hint(), TypeHint::GeomPoint);
        assert_eq!(point.logical_type.struct_fields().map(|f| f.len()), Some(2));
        assert!(point.annotation.matches_shape(&point.logical_type));

        let circle = resolve("circle");
        assert_eq!(circle.logical_type, LogicalType::list(LogicalType::Double));
        assert_eq!(circle.hint(), TypeHint::GeomCircle);
    }

    #[test]
    fn test_postgis_geometry_round_trip() {
        let geom = resolve("geometry");
        assert_eq!(geom.logical_type, LogicalType::Blob);
        assert_eq!(geom.hint(), TypeHint::Wkb);
        assert_eq!(geom.to_sql().unwrap(), "GEOMETRY");
        assert_eq!(to_remote_type(&geom.logical_type), LogicalType::Blob);

        let desc = geom.to_remote_descriptor().unwrap();
        assert_eq!(desc.type_name, "geometry");
        assert_eq!(resolve_type(&desc, None, &ResolveOptions::default()), geom);

        let list = resolve("_geometry");
        assert_eq!(list.to_sql().unwrap(), "GEOMETRY[]");
        let desc = list.to_remote_descriptor().unwrap();
        assert_eq!(desc.type_name, "_geometry");
        assert_eq!(resolve_type(&desc, None, &ResolveOptions::default()), list);

        // plain bytea keeps its own spelling
        assert_eq!(resolve("bytea").to_sql().unwrap(), "BYTEA");
        assert_eq!(resolve("bytea").to_remote_descriptor().unwrap().type_name, "bytea");
    }

    #[test]
    fn test_every_table_entry_is_well_shaped() {
        for name in scalar_type_names() {
            let r = resolve(name);
            assert!(
                r.annotation.matches_shape(&r.logical_type),
                "annotation shape mismatch for {}",
                name
            );
        }
    }

    #[test]
    fn test_registry_enum_and_composite() {
        let registry = TypeRegistry::new();
        registry.register_enum("mood", ["sad", "ok", "happy"]);
        registry.register_composite(
            "inventory_item",
            &[
                ("name".to_string(), RemoteTypeDescriptor::new("text")),
                ("feeling".to_string(), RemoteTypeDescriptor::new("mood")),
                ("code".to_string(), RemoteTypeDescriptor::new("bpchar")),
            ],
            &ResolveOptions::default(),
        );
        assert_eq!(registry.len(), 2);

        let r = resolve_type(
            &RemoteTypeDescriptor::new("inventory_item"),
            Some(&registry),
            &ResolveOptions::default(),
        );
        let fields = r.logical_type.struct_fields().unwrap();
        assert_eq!(fields[0].1, LogicalType::Varchar);
        assert!(matches!(fields[1].1, LogicalType::Enum { .. }));
        assert_eq!(r.annotation.children[2].hint, TypeHint::FixedLengthChar);
        assert!(r.annotation.matches_shape(&r.logical_type));
    }

    #[test]
    fn test_closure_lookup() {
        let lookup = |name: &str| (name == "mood").then(|| ResolvedType::plain(LogicalType::Boolean));
        let r = resolve_type(
            &RemoteTypeDescriptor::new("mood"),
            Some(&lookup),
            &ResolveOptions::default(),
        );
        assert_eq!(r.logical_type, LogicalType::Boolean);
    }

    #[test]
    fn test_to_remote_type_widening() {
        assert_eq!(to_remote_type(&LogicalType::TinyInt), LogicalType::SmallInt);
        assert_eq!(to_remote_type(&LogicalType::UInteger), LogicalType::BigInt);
        assert_eq!(to_remote_type(&LogicalType::UBigInt), LogicalType::decimal(20, 0));
        assert_eq!(to_remote_type(&LogicalType::HugeInt), LogicalType::Double);
        assert_eq!(to_remote_type(&LogicalType::TimestampNs), LogicalType::Timestamp);
        assert_eq!(to_remote_type(&LogicalType::Bit), LogicalType::Varchar);
        assert_eq!(
            to_remote_type(&LogicalType::list(LogicalType::UTinyInt)),
            LogicalType::list(LogicalType::BigInt)
        );
    }

    #[test]
    fn test_round_trip_is_fixed_point() {
        let options = ResolveOptions::default();
        for name in scalar_type_names() {
            let resolved = resolve(name).logical_type;
            let remote = to_remote_type(&resolved);
            assert_eq!(to_remote_type(&remote), remote, "{} is not stable", name);
            if let Ok(desc) = to_remote_descriptor(&remote) {
                let again = resolve_type(&desc, None, &options).logical_type;
                assert_eq!(to_remote_type(&again), remote, "{} does not re-resolve", name);
            }
        }
    }

    #[test]
    fn test_remote_descriptor_for_lists_and_decimals() {
        let desc = to_remote_descriptor(&LogicalType::list(LogicalType::list(LogicalType::UBigInt)))
            .unwrap();
        assert_eq!(desc.type_name, "_numeric");
        assert_eq!(desc.array_dimensions, 2);
        assert_eq!(decimal_from_modifier(desc.type_modifier), Some((20, 0)));
    }

    #[test]
    fn test_type_to_sql() {
        assert_eq!(type_to_sql(&LogicalType::Double).unwrap(), "FLOAT");
        assert_eq!(type_to_sql(&LogicalType::Float).unwrap(), "REAL");
        assert_eq!(
            type_to_sql(&LogicalType::list(LogicalType::Blob)).unwrap(),
            "BYTEA[]"
        );
        assert_eq!(type_to_sql(&LogicalType::decimal(20, 0)).unwrap(), "DECIMAL(20,0)");
        let unnamed = LogicalType::struct_of([("a", LogicalType::Integer)]);
        assert!(matches!(type_to_sql(&unnamed), Err(ScanError::Unsupported(_))));
        let named = LogicalType::Struct {
            name: Some("pair".to_string()),
            fields: vec![],
        };
        assert_eq!(type_to_sql(&named).unwrap(), "pair");
        assert!(type_to_sql(&LogicalType::Map(
            Box::new(LogicalType::Varchar),
            Box::new(LogicalType::Integer)
        ))
        .is_err());
    }

    #[test]
    fn test_to_remote_oid() {
        assert_eq!(to_remote_oid(&LogicalType::Integer).unwrap(), Oid::INT4);
        assert_eq!(
            to_remote_oid(&LogicalType::list(LogicalType::Uuid)).unwrap(),
            Oid::UUID
        );
        assert!(to_remote_oid(&LogicalType::HugeInt).is_err());
    }
}
