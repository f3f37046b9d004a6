use std::hash::{Hash, Hasher};

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::query::QueryModel;
use crate::types::Ty;

/// A node of the host query's expression tree, before translation.
///
/// Nodes are immutable once built; rewriting produces new nodes.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize, EnumAsInner)]
pub enum ExprKind {
    Constant(Literal),

    /// Placeholder for a value supplied when the compiled query is executed.
    Parameter(String),

    /// Reference to a query source (range variable) in scope.
    SourceRef(String),

    /// `target.member`. Static members have no target and a member name
    /// qualified by the declaring type, such as `DateTime.Now`.
    MemberAccess {
        target: Option<Box<Expr>>,
        member: String,
    },

    MethodCall {
        target: Option<Box<Expr>>,
        method: MethodId,
        args: Vec<Expr>,
    },

    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },

    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },

    /// Construction of an anonymous object: `new { Name = c.Name, ... }`.
    New(Vec<(String, Expr)>),

    Subquery(Box<QueryModel>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

// Floats hash by their bit pattern, so that trees can be fingerprinted.
impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Literal::Null => {}
            Literal::Boolean(b) => b.hash(state),
            Literal::Integer(i) => i.hash(state),
            Literal::Float(f) => f.to_bits().hash(state),
            Literal::String(s) => s.hash(state),
        }
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Boolean(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

/// Identity of a host method; translators match on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId {
    pub declaring_type: String,
    pub name: String,
    /// Declared parameter types, excluding the instance.
    pub params: Vec<Ty>,
    pub is_static: bool,
}

impl MethodId {
    pub fn instance<S: ToString, N: ToString>(declaring_type: S, name: N, params: Vec<Ty>) -> Self {
        MethodId {
            declaring_type: declaring_type.to_string(),
            name: name.to_string(),
            params,
            is_static: false,
        }
    }

    pub fn static_method<S: ToString, N: ToString>(
        declaring_type: S,
        name: N,
        params: Vec<Ty>,
    ) -> Self {
        MethodId {
            declaring_type: declaring_type.to_string(),
            name: name.to_string(),
            params,
            is_static: true,
        }
    }

    pub fn is(&self, declaring_type: &str, name: &str) -> bool {
        self.declaring_type == declaring_type && self.name == name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::AsRefStr)]
pub enum UnOp {
    Not,
    Negate,
    /// Conversion to the type of the enclosing node.
    Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::AsRefStr)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitOr,
    AndAlso,
    OrElse,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Coalesce,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Equal
                | BinOp::NotEqual
                | BinOp::LessThan
                | BinOp::LessThanOrEqual
                | BinOp::GreaterThan
                | BinOp::GreaterThanOrEqual
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::AndAlso | BinOp::OrElse)
    }
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Ty) -> Self {
        Expr { kind, ty }
    }

    pub fn constant<L: Into<Literal>>(value: L, ty: Ty) -> Self {
        Expr::new(ExprKind::Constant(value.into()), ty)
    }

    pub fn int(value: i64) -> Self {
        Expr::constant(value, Ty::Int32)
    }

    pub fn string<S: ToString>(value: S) -> Self {
        Expr::constant(value.to_string(), Ty::String)
    }

    pub fn boolean(value: bool) -> Self {
        Expr::constant(value, Ty::Bool)
    }

    pub fn null(ty: Ty) -> Self {
        Expr::new(ExprKind::Constant(Literal::Null), ty)
    }

    pub fn param<S: ToString>(name: S, ty: Ty) -> Self {
        Expr::new(ExprKind::Parameter(name.to_string()), ty)
    }

    pub fn source<S: ToString>(name: S, ty: Ty) -> Self {
        Expr::new(ExprKind::SourceRef(name.to_string()), ty)
    }

    pub fn member<S: ToString>(self, member: S, ty: Ty) -> Self {
        Expr::new(
            ExprKind::MemberAccess {
                target: Some(Box::new(self)),
                member: member.to_string(),
            },
            ty,
        )
    }

    pub fn static_member<S: ToString>(member: S, ty: Ty) -> Self {
        Expr::new(
            ExprKind::MemberAccess {
                target: None,
                member: member.to_string(),
            },
            ty,
        )
    }

    pub fn call(self, method: MethodId, args: Vec<Expr>, ty: Ty) -> Self {
        Expr::new(
            ExprKind::MethodCall {
                target: Some(Box::new(self)),
                method,
                args,
            },
            ty,
        )
    }

    pub fn call_static(method: MethodId, args: Vec<Expr>, ty: Ty) -> Self {
        Expr::new(
            ExprKind::MethodCall {
                target: None,
                method,
                args,
            },
            ty,
        )
    }

    pub fn unary(op: UnOp, operand: Expr) -> Self {
        let ty = operand.ty.clone();
        Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn logical_not(self) -> Self {
        Expr::unary(UnOp::Not, self)
    }

    pub fn convert(self, ty: Ty) -> Self {
        Expr::new(
            ExprKind::Unary {
                op: UnOp::Convert,
                operand: Box::new(self),
            },
            ty,
        )
    }

    /// Builds a binary node, inferring its type from the operator and operands.
    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        let ty = if op.is_comparison() || op.is_logical() {
            Ty::Bool
        } else if op == BinOp::Coalesce {
            right.ty.clone()
        } else if op == BinOp::Add && (left.ty.is_string() || right.ty.is_string()) {
            Ty::String
        } else if left.ty.is_nullable() || right.ty.is_nullable() {
            left.ty.unwrap_nullable().clone().nullable()
        } else {
            left.ty.clone()
        };
        Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn equal(self, other: Expr) -> Self {
        Expr::binary(BinOp::Equal, self, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::binary(BinOp::AndAlso, self, other)
    }

    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        let ty = if_true.ty.clone();
        Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                if_true: Box::new(if_true),
                if_false: Box::new(if_false),
            },
            ty,
        )
    }

    pub fn new_object<S: ToString>(members: Vec<(S, Expr)>) -> Self {
        let members = members
            .into_iter()
            .map(|(name, expr)| (name.to_string(), expr))
            .collect();
        Expr::new(ExprKind::New(members), Ty::class("<anonymous>"))
    }

    pub fn subquery(query: QueryModel, ty: Ty) -> Self {
        Expr::new(ExprKind::Subquery(Box::new(query)), ty)
    }

    /// Removes conversion wrappers, yielding the converted operand.
    pub fn strip_convert(&self) -> &Expr {
        match &self.kind {
            ExprKind::Unary {
                op: UnOp::Convert,
                operand,
            } => operand.strip_convert(),
            _ => self,
        }
    }

    /// Removes a single conversion to `object`, if present.
    pub fn strip_boxing(&self) -> &Expr {
        match &self.kind {
            ExprKind::Unary {
                op: UnOp::Convert,
                operand,
            } if self.ty == Ty::Object => operand,
            _ => self,
        }
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(Literal::Null))
    }

    pub fn as_integer_constant(&self) -> Option<i64> {
        match &self.strip_convert().kind {
            ExprKind::Constant(Literal::Integer(i)) => Some(*i),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of(expr: &Expr) -> u64 {
        let mut hasher = DefaultHasher::new();
        expr.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_binary_type_inference() {
        let name = Expr::source("c", Ty::class("Customer")).member("Name", Ty::String);
        let age = Expr::param("age", Ty::Int32.nullable());

        assert_eq!(Expr::binary(BinOp::Add, name.clone(), Expr::int(1)).ty, Ty::String);
        assert_eq!(
            Expr::binary(BinOp::Add, age.clone(), Expr::int(1)).ty,
            Ty::Int32.nullable()
        );
        assert_eq!(name.equal(Expr::string("A")).ty, Ty::Bool);
    }

    #[test]
    fn test_float_hash() {
        let a = Expr::constant(0.5, Ty::Float64);
        let b = Expr::constant(0.5, Ty::Float64);
        let c = Expr::constant(0.25, Ty::Float64);

        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(hash_of(&a), hash_of(&c));
    }

    #[test]
    fn test_strip_convert() {
        let boxed = Expr::int(3).convert(Ty::Int64).convert(Ty::Object);

        assert_eq!(boxed.strip_boxing().ty, Ty::Int64);
        assert_eq!(boxed.strip_convert(), &Expr::int(3));
        assert_eq!(boxed.as_integer_constant(), Some(3));
    }
}
