//! Variable substitutions.
//!
//! A substitution maps variable names to types. Applying one is a
//! structural rewrite that replaces every free occurrence; the solver
//! produces substitutions whose values contain none of their own keys, so
//! applying twice equals applying once.

use std::fmt;

use indexmap::IndexMap;

use crate::types::{Type, TypeKind};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Substitution {
    map: IndexMap<String, Type>,
}

impl Substitution {
    pub fn new() -> Self {
        Substitution {
            map: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: Type) {
        self.map.insert(name.into(), ty);
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.map.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Type)> {
        self.map.iter()
    }

    /// Apply this substitution to a type, yielding a new tree.
    #[must_use]
    pub fn apply(&self, ty: &Type) -> Type {
        if self.map.is_empty() {
            return ty.clone();
        }
        let kind = match &ty.kind {
            TypeKind::Var(name) => {
                return match self.map.get(name) {
                    Some(replacement) => replacement.clone(),
                    None => ty.clone(),
                };
            }
            TypeKind::Top | TypeKind::Bot | TypeKind::Any | TypeKind::Logic(_) => {
                return ty.clone();
            }
            TypeKind::Nominal { kind, name, args } => TypeKind::Nominal {
                kind: *kind,
                name: name.clone(),
                args: args.iter().map(|a| self.apply(a)).collect(),
            },
            TypeKind::Union(members) => {
                return Type::union(members.iter().map(|m| self.apply(m)).collect());
            }
            TypeKind::Intersection(members) => {
                return Type::intersection(members.iter().map(|m| self.apply(m)).collect());
            }
            TypeKind::Tuple(elems) => {
                TypeKind::Tuple(elems.iter().map(|e| self.apply(e)).collect())
            }
            TypeKind::Record(fields) => TypeKind::Record(
                fields
                    .iter()
                    .map(|(k, t)| (k.clone(), self.apply(t)))
                    .collect(),
            ),
            TypeKind::Proc(proc) => {
                return Type::proc(
                    proc.params.iter().map(|p| self.apply(p)).collect(),
                    proc.keywords
                        .iter()
                        .map(|(k, t)| (k.clone(), self.apply(t)))
                        .collect(),
                    self.apply(&proc.ret),
                );
            }
        };
        Type { kind, loc: ty.loc }
    }

    /// Merge `other` into this substitution: existing values are rewritten
    /// through `other`, then `other`'s own bindings are added.
    pub fn merge(&mut self, other: &Substitution) {
        if other.is_empty() {
            return;
        }
        for (_, value) in self.map.iter_mut() {
            *value = other.apply(value);
        }
        for (name, ty) in other.iter() {
            self.map.entry(name.clone()).or_insert_with(|| ty.clone());
        }
    }

    /// Rewrite each value through the substitution itself, so the result
    /// is idempotent even when a value mentioned another key.
    pub fn normalize(&mut self) {
        let snapshot = self.clone();
        for (_, value) in self.map.iter_mut() {
            *value = snapshot.apply(value);
        }
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, ty)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name} => {ty}")?;
        }
        write!(f, "}}")
    }
}
