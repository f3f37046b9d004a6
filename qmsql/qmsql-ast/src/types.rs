use serde::{Deserialize, Serialize};

/// Static type of an expression node, as declared by the host program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    Bool,
    Byte,
    Int16,
    Int32,
    Int64,
    Float64,
    Decimal,
    String,
    Char,
    DateTime,
    Guid,

    /// The universal boxing type. Every value converts to it.
    Object,

    Enum {
        name: String,
        underlying: Box<Ty>,
    },

    Nullable(Box<Ty>),

    /// Entity or other reference type, identified by name.
    Class(String),

    Sequence(Box<Ty>),
}

impl Ty {
    pub fn enumeration<S: ToString>(name: S, underlying: Ty) -> Ty {
        Ty::Enum {
            name: name.to_string(),
            underlying: Box::new(underlying),
        }
    }

    pub fn class<S: ToString>(name: S) -> Ty {
        Ty::Class(name.to_string())
    }

    pub fn sequence(element: Ty) -> Ty {
        Ty::Sequence(Box::new(element))
    }

    /// Wraps the type into `Nullable`, unless it already is.
    pub fn nullable(self) -> Ty {
        match self {
            Ty::Nullable(_) => self,
            _ => Ty::Nullable(Box::new(self)),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Ty::Nullable(_))
    }

    pub fn unwrap_nullable(&self) -> &Ty {
        match self {
            Ty::Nullable(inner) => inner,
            _ => self,
        }
    }

    /// Strips nullability and enum wrappers, yielding the type that is
    /// actually stored.
    pub fn unwrap_enum(&self) -> &Ty {
        match self.unwrap_nullable() {
            Ty::Enum { underlying, .. } => underlying.unwrap_nullable(),
            ty => ty,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.unwrap_nullable(),
            Ty::Byte | Ty::Int16 | Ty::Int32 | Ty::Int64
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self.unwrap_nullable(), Ty::Float64 | Ty::Decimal)
    }

    pub fn is_string(&self) -> bool {
        matches!(self.unwrap_nullable(), Ty::String)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.unwrap_nullable(), Ty::Bool)
    }

    /// True for types whose values can be represented as a single SQL value.
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self.unwrap_nullable(),
            Ty::Object | Ty::Class(_) | Ty::Sequence(_)
        )
    }
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Bool => f.write_str("bool"),
            Ty::Byte => f.write_str("byte"),
            Ty::Int16 => f.write_str("short"),
            Ty::Int32 => f.write_str("int"),
            Ty::Int64 => f.write_str("long"),
            Ty::Float64 => f.write_str("double"),
            Ty::Decimal => f.write_str("decimal"),
            Ty::String => f.write_str("string"),
            Ty::Char => f.write_str("char"),
            Ty::DateTime => f.write_str("DateTime"),
            Ty::Guid => f.write_str("Guid"),
            Ty::Object => f.write_str("object"),
            Ty::Enum { name, .. } | Ty::Class(name) => f.write_str(name),
            Ty::Nullable(inner) => write!(f, "{inner}?"),
            Ty::Sequence(element) => write!(f, "IEnumerable<{element}>"),
        }
    }
}
