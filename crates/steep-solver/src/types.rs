//! The type algebra.
//!
//! Types are immutable trees, freely shared by cloning; substitution
//! yields new nodes. Structural equality and hashing ignore source
//! locations, so two types parsed from different files compare equal when
//! their shapes match.
//!
//! Normalization invariants maintained by the constructors:
//! - `Union([])` is `bot`, `Intersection([])` is `top`
//! - single-member unions/intersections collapse to the member
//! - nested unions/intersections of the same shape are flattened
//! - union/intersection members are deduplicated and sorted, making them
//!   order-insensitive

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use steep_common::Span;

/// What a nominal type name refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NominalKind {
    /// An instance of a class, `::Integer`
    Instance,
    /// The class object itself, `singleton(::Integer)`
    Class,
    /// A type alias, expanded through the environment
    Alias,
    /// A structural interface, `::_Each`
    Interface,
}

/// Truthiness-tracking types appearing at expression positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicKind {
    Truthy,
    Falsy,
    Envelope,
}

/// Per-position polarity controlling the direction of recursive subtype
/// checks on nominal type arguments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Variance {
    #[default]
    Invariant,
    Covariant,
    Contravariant,
}

/// A procedure type: positional parameters, keyword parameters matched by
/// name, and a return type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProcType {
    pub params: Vec<Type>,
    /// Keyword parameters, sorted by name at construction.
    pub keywords: Vec<(String, Type)>,
    pub ret: Type,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// A type variable; whether it is an unknown or rigid is decided by
    /// the constraint store consulted at check time.
    Var(String),
    Top,
    Bot,
    Any,
    Nominal {
        kind: NominalKind,
        name: String,
        args: Vec<Type>,
    },
    Union(Vec<Type>),
    Intersection(Vec<Type>),
    Tuple(Vec<Type>),
    /// Key-sensitive record; fields sorted by key at construction.
    Record(Vec<(String, Type)>),
    Proc(Box<ProcType>),
    Logic(LogicKind),
}

/// A type tree node with an optional source location.
///
/// Equality and hashing are structural on `kind` only.
#[derive(Clone, Debug)]
pub struct Type {
    pub kind: TypeKind,
    pub loc: Option<Span>,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

/// Name of the builtin boolean nominal, the target of `Logic` coercion.
pub const BOOL_NAME: &str = "::bool";

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Type { kind, loc: None }
    }

    #[must_use]
    pub fn with_loc(mut self, loc: Span) -> Self {
        self.loc = Some(loc);
        self
    }

    pub fn var(name: impl Into<String>) -> Self {
        Type::new(TypeKind::Var(name.into()))
    }

    pub fn top() -> Self {
        Type::new(TypeKind::Top)
    }

    pub fn bot() -> Self {
        Type::new(TypeKind::Bot)
    }

    pub fn any() -> Self {
        Type::new(TypeKind::Any)
    }

    pub fn instance(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::new(TypeKind::Nominal {
            kind: NominalKind::Instance,
            name: name.into(),
            args,
        })
    }

    pub fn class(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::new(TypeKind::Nominal {
            kind: NominalKind::Class,
            name: name.into(),
            args,
        })
    }

    pub fn alias(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::new(TypeKind::Nominal {
            kind: NominalKind::Alias,
            name: name.into(),
            args,
        })
    }

    pub fn interface(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::new(TypeKind::Nominal {
            kind: NominalKind::Interface,
            name: name.into(),
            args,
        })
    }

    /// The builtin boolean instance type.
    pub fn bool_instance() -> Self {
        Type::instance(BOOL_NAME, vec![])
    }

    pub fn logic(kind: LogicKind) -> Self {
        Type::new(TypeKind::Logic(kind))
    }

    /// Build a normalized union.
    pub fn union(members: Vec<Type>) -> Self {
        let mut flat = Vec::new();
        Self::flatten_into(members, &mut flat, true);

        if flat.iter().any(|t| matches!(t.kind, TypeKind::Top)) {
            return Type::top();
        }
        if flat.iter().any(|t| matches!(t.kind, TypeKind::Any)) {
            return Type::any();
        }
        flat.retain(|t| !matches!(t.kind, TypeKind::Bot));

        let mut members = Vec::new();
        for ty in flat {
            if !members.contains(&ty) {
                members.push(ty);
            }
        }
        members.sort_by_cached_key(|t| t.to_string());

        match members.len() {
            0 => Type::bot(),
            1 => members.into_iter().next().unwrap_or_else(Type::bot),
            _ => Type::new(TypeKind::Union(members)),
        }
    }

    /// Build a normalized intersection.
    pub fn intersection(members: Vec<Type>) -> Self {
        let mut flat = Vec::new();
        Self::flatten_into(members, &mut flat, false);

        if flat.iter().any(|t| matches!(t.kind, TypeKind::Bot)) {
            return Type::bot();
        }
        if flat.iter().any(|t| matches!(t.kind, TypeKind::Any)) {
            return Type::any();
        }
        flat.retain(|t| !matches!(t.kind, TypeKind::Top));

        let mut members = Vec::new();
        for ty in flat {
            if !members.contains(&ty) {
                members.push(ty);
            }
        }
        members.sort_by_cached_key(|t| t.to_string());

        match members.len() {
            0 => Type::top(),
            1 => members.into_iter().next().unwrap_or_else(Type::top),
            _ => Type::new(TypeKind::Intersection(members)),
        }
    }

    fn flatten_into(members: Vec<Type>, out: &mut Vec<Type>, union: bool) {
        for member in members {
            match member.kind {
                TypeKind::Union(inner) if union => Self::flatten_into(inner, out, union),
                TypeKind::Intersection(inner) if !union => Self::flatten_into(inner, out, union),
                _ => out.push(member),
            }
        }
    }

    pub fn tuple(elems: Vec<Type>) -> Self {
        Type::new(TypeKind::Tuple(elems))
    }

    /// Build a record; fields are sorted by key so records are
    /// key-sensitive but order-insensitive.
    pub fn record(mut fields: Vec<(String, Type)>) -> Self {
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        Type::new(TypeKind::Record(fields))
    }

    /// Build a proc type; keywords are sorted by name.
    pub fn proc(params: Vec<Type>, mut keywords: Vec<(String, Type)>, ret: Type) -> Self {
        keywords.sort_by(|a, b| a.0.cmp(&b.0));
        Type::new(TypeKind::Proc(Box::new(ProcType {
            params,
            keywords,
            ret,
        })))
    }

    /// Collect the free variables of this type, in name order.
    pub fn free_variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_free_variables(&mut out);
        out
    }

    fn collect_free_variables(&self, out: &mut BTreeSet<String>) {
        match &self.kind {
            TypeKind::Var(name) => {
                out.insert(name.clone());
            }
            TypeKind::Top | TypeKind::Bot | TypeKind::Any | TypeKind::Logic(_) => {}
            TypeKind::Nominal { args, .. } => {
                for arg in args {
                    arg.collect_free_variables(out);
                }
            }
            TypeKind::Union(members) | TypeKind::Intersection(members) => {
                for member in members {
                    member.collect_free_variables(out);
                }
            }
            TypeKind::Tuple(elems) => {
                for elem in elems {
                    elem.collect_free_variables(out);
                }
            }
            TypeKind::Record(fields) => {
                for (_, ty) in fields {
                    ty.collect_free_variables(out);
                }
            }
            TypeKind::Proc(proc) => {
                for param in &proc.params {
                    param.collect_free_variables(out);
                }
                for (_, ty) in &proc.keywords {
                    ty.collect_free_variables(out);
                }
                proc.ret.collect_free_variables(out);
            }
        }
    }

    /// The nesting level of a type: its node count. Used as the
    /// tiebreaker when an invariant unknown has both bounds.
    pub fn level(&self) -> usize {
        let children: usize = match &self.kind {
            TypeKind::Var(_)
            | TypeKind::Top
            | TypeKind::Bot
            | TypeKind::Any
            | TypeKind::Logic(_) => 0,
            TypeKind::Nominal { args, .. } => args.iter().map(Type::level).sum(),
            TypeKind::Union(members)
            | TypeKind::Intersection(members)
            | TypeKind::Tuple(members) => members.iter().map(Type::level).sum(),
            TypeKind::Record(fields) => fields.iter().map(|(_, t)| t.level()).sum(),
            TypeKind::Proc(proc) => {
                proc.params.iter().map(Type::level).sum::<usize>()
                    + proc.keywords.iter().map(|(_, t)| t.level()).sum::<usize>()
                    + proc.ret.level()
            }
        };
        1 + children
    }

    /// Whether this is a `Logic` type.
    pub fn is_logic(&self) -> bool {
        matches!(self.kind, TypeKind::Logic(_))
    }

    /// Coerce `Logic` to the boolean nominal; other types pass through.
    #[must_use]
    pub fn coerce_logic(&self) -> Type {
        if self.is_logic() {
            Type::bool_instance()
        } else {
            self.clone()
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Type], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Var(name) => write!(f, "{name}"),
            TypeKind::Top => write!(f, "top"),
            TypeKind::Bot => write!(f, "bot"),
            TypeKind::Any => write!(f, "any"),
            TypeKind::Nominal { kind, name, args } => {
                match kind {
                    NominalKind::Class => write!(f, "singleton({name})")?,
                    _ => write!(f, "{name}")?,
                }
                if !args.is_empty() {
                    write!(f, "[")?;
                    write_list(f, args, ", ")?;
                    write!(f, "]")?;
                }
                Ok(())
            }
            TypeKind::Union(members) => write_list(f, members, " | "),
            TypeKind::Intersection(members) => write_list(f, members, " & "),
            TypeKind::Tuple(elems) => {
                write!(f, "[")?;
                write_list(f, elems, ", ")?;
                write!(f, "]")
            }
            TypeKind::Record(fields) => {
                write!(f, "{{ ")?;
                for (i, (key, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {ty}")?;
                }
                write!(f, " }}")
            }
            TypeKind::Proc(proc) => {
                write!(f, "(")?;
                write_list(f, &proc.params, ", ")?;
                for (i, (key, ty)) in proc.keywords.iter().enumerate() {
                    if i > 0 || !proc.params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {ty}")?;
                }
                write!(f, ") -> {}", proc.ret)
            }
            TypeKind::Logic(LogicKind::Truthy) => write!(f, "truthy"),
            TypeKind::Logic(LogicKind::Falsy) => write!(f, "falsy"),
            TypeKind::Logic(LogicKind::Envelope) => write!(f, "logic"),
        }
    }
}
