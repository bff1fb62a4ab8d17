//! The syntax-level AST for signature files.
//!
//! Names are kept as written: whether `A` is a type variable or a class
//! reference depends on the enclosing declaration's type parameters, which
//! is resolved when the environment is built, not here.

use steep_common::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeExprKind {
    /// `Name` or `Name[Args]`; variable vs nominal resolved later.
    Name { name: String, args: Vec<TypeExpr> },
    /// `singleton(Name)`
    Singleton { name: String },
    Top,
    Bot,
    Any,
    SelfType,
    Union(Vec<TypeExpr>),
    Intersection(Vec<TypeExpr>),
    Tuple(Vec<TypeExpr>),
    Record(Vec<(String, TypeExpr)>),
    Proc {
        params: Vec<TypeExpr>,
        keywords: Vec<(String, TypeExpr)>,
        ret: Box<TypeExpr>,
    },
}

impl TypeExpr {
    pub fn new(kind: TypeExprKind, span: Span) -> Self {
        TypeExpr { kind, span }
    }
}

/// Variance marker on a declared type parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VarianceDef {
    #[default]
    Invariant,
    /// `out`
    Covariant,
    /// `in`
    Contravariant,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeParamDef {
    pub name: String,
    pub variance: VarianceDef,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodDef {
    pub name: String,
    /// Generic method parameters: `def map: [B] ((A) -> B) -> Array[B]`
    pub type_params: Vec<String>,
    pub ty: TypeExpr,
    /// Span of the whole `def` line.
    pub span: Span,
    /// Span of just the method name, for precise diagnostics.
    pub name_span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub name_span: Span,
    pub type_params: Vec<TypeParamDef>,
    pub superclass: Option<TypeExpr>,
    pub methods: Vec<MethodDef>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceDef {
    pub name: String,
    pub name_span: Span,
    pub type_params: Vec<TypeParamDef>,
    pub methods: Vec<MethodDef>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AliasDef {
    pub name: String,
    pub name_span: Span,
    pub type_params: Vec<TypeParamDef>,
    pub body: TypeExpr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decl {
    Class(ClassDef),
    Interface(InterfaceDef),
    Alias(AliasDef),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Class(def) => &def.name,
            Decl::Interface(def) => &def.name,
            Decl::Alias(def) => &def.name,
        }
    }

    pub fn name_span(&self) -> Span {
        match self {
            Decl::Class(def) => def.name_span,
            Decl::Interface(def) => def.name_span,
            Decl::Alias(def) => def.name_span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Decl::Class(def) => def.span,
            Decl::Interface(def) => def.span,
            Decl::Alias(def) => def.span,
        }
    }
}
