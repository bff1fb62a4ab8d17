//! The type environment.
//!
//! Nominal recursion never happens through pointer cycles: a nominal type
//! holds a name, and everything about that name (superclass, type
//! parameters and their variance, methods, alias bodies) is looked up
//! here. The environment is built once per process from the signature
//! files and is immutable during checking.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use steep_common::Span;

use crate::subst::Substitution;
use crate::types::{Type, Variance};

/// A declared type parameter with its variance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeParam {
    pub name: String,
    pub variance: Variance,
}

impl TypeParam {
    pub fn invariant(name: impl Into<String>) -> Self {
        TypeParam {
            name: name.into(),
            variance: Variance::Invariant,
        }
    }

    pub fn covariant(name: impl Into<String>) -> Self {
        TypeParam {
            name: name.into(),
            variance: Variance::Covariant,
        }
    }

    pub fn contravariant(name: impl Into<String>) -> Self {
        TypeParam {
            name: name.into(),
            variance: Variance::Contravariant,
        }
    }
}

/// A method signature: generic parameters (rigid inside the body, unknowns
/// at call and override sites) and a proc type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDecl {
    pub type_params: Vec<String>,
    pub ty: Type,
    pub loc: Option<Span>,
}

#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub superclass: Option<Type>,
    pub methods: IndexMap<String, MethodDecl>,
    pub loc: Option<Span>,
}

#[derive(Clone, Debug)]
pub struct InterfaceDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub methods: IndexMap<String, MethodDecl>,
    pub loc: Option<Span>,
}

#[derive(Clone, Debug)]
pub struct AliasDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub body: Type,
    pub loc: Option<Span>,
}

/// Immutable registry of every known nominal name.
#[derive(Clone, Debug, Default)]
pub struct TypeEnv {
    classes: FxHashMap<String, ClassDecl>,
    interfaces: FxHashMap<String, InterfaceDecl>,
    aliases: FxHashMap<String, AliasDecl>,
}

impl TypeEnv {
    pub fn new() -> Self {
        TypeEnv::default()
    }

    /// An environment seeded with the builtin core: `::Object` at the
    /// root, numerics, strings, symbols, booleans, arrays and hashes.
    pub fn core() -> Self {
        let mut env = TypeEnv::new();
        let object = |name: &str| ClassDecl {
            name: name.to_string(),
            type_params: vec![],
            superclass: Some(Type::instance("::Object", vec![])),
            methods: IndexMap::new(),
            loc: None,
        };

        env.insert_class(ClassDecl {
            name: "::Object".to_string(),
            type_params: vec![],
            superclass: None,
            methods: IndexMap::new(),
            loc: None,
        });
        env.insert_class(object("::Numeric"));
        env.insert_class(ClassDecl {
            superclass: Some(Type::instance("::Numeric", vec![])),
            ..object("::Integer")
        });
        env.insert_class(ClassDecl {
            superclass: Some(Type::instance("::Numeric", vec![])),
            ..object("::Float")
        });
        env.insert_class(object("::String"));
        env.insert_class(object("::Symbol"));
        env.insert_class(object("::bool"));
        env.insert_class(object("::Proc"));
        env.insert_class(ClassDecl {
            type_params: vec![TypeParam::covariant("Elem")],
            ..object("::Array")
        });
        env.insert_class(ClassDecl {
            type_params: vec![TypeParam::invariant("K"), TypeParam::covariant("V")],
            ..object("::Hash")
        });
        env
    }

    /// Insert a class; returns false if the name was already taken by any
    /// kind of declaration.
    pub fn insert_class(&mut self, decl: ClassDecl) -> bool {
        if self.contains(&decl.name) {
            return false;
        }
        self.classes.insert(decl.name.clone(), decl);
        true
    }

    pub fn insert_interface(&mut self, decl: InterfaceDecl) -> bool {
        if self.contains(&decl.name) {
            return false;
        }
        self.interfaces.insert(decl.name.clone(), decl);
        true
    }

    pub fn insert_alias(&mut self, decl: AliasDecl) -> bool {
        if self.contains(&decl.name) {
            return false;
        }
        self.aliases.insert(decl.name.clone(), decl);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
            || self.interfaces.contains_key(name)
            || self.aliases.contains_key(name)
    }

    pub fn class_decl(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.get(name)
    }

    pub fn interface_decl(&self, name: &str) -> Option<&InterfaceDecl> {
        self.interfaces.get(name)
    }

    pub fn alias_decl(&self, name: &str) -> Option<&AliasDecl> {
        self.aliases.get(name)
    }

    /// Number of type parameters `name` expects, whatever kind it is.
    pub fn arity(&self, name: &str) -> Option<usize> {
        if let Some(decl) = self.classes.get(name) {
            return Some(decl.type_params.len());
        }
        if let Some(decl) = self.interfaces.get(name) {
            return Some(decl.type_params.len());
        }
        self.aliases.get(name).map(|d| d.type_params.len())
    }

    /// Declared variance of each type parameter of `name`.
    pub fn variances(&self, name: &str) -> Option<Vec<Variance>> {
        let params = if let Some(decl) = self.classes.get(name) {
            &decl.type_params
        } else if let Some(decl) = self.interfaces.get(name) {
            &decl.type_params
        } else if let Some(decl) = self.aliases.get(name) {
            &decl.type_params
        } else {
            return None;
        };
        Some(params.iter().map(|p| p.variance).collect())
    }

    fn param_substitution(params: &[TypeParam], args: &[Type]) -> Substitution {
        let mut subst = Substitution::new();
        for (param, arg) in params.iter().zip(args.iter()) {
            subst.insert(param.name.clone(), arg.clone());
        }
        subst
    }

    /// The superclass of `name` instantiated with `args`, or None at the
    /// root of the hierarchy (and for unknown names).
    pub fn superclass_of(&self, name: &str, args: &[Type]) -> Option<Type> {
        let decl = self.classes.get(name)?;
        let superclass = decl.superclass.as_ref()?;
        let subst = Self::param_substitution(&decl.type_params, args);
        Some(subst.apply(superclass))
    }

    /// Expand an alias application to its body.
    pub fn expand_alias(&self, name: &str, args: &[Type]) -> Option<Type> {
        let decl = self.aliases.get(name)?;
        let subst = Self::param_substitution(&decl.type_params, args);
        Some(subst.apply(&decl.body))
    }

    /// Look up a method on a class, walking the superclass chain, with
    /// class type arguments substituted into the signature. Returns the
    /// generic parameters alongside the instantiated proc type.
    pub fn method_of(&self, name: &str, args: &[Type], method: &str) -> Option<MethodDecl> {
        let mut current = Some((name.to_string(), args.to_vec()));
        while let Some((class_name, class_args)) = current {
            let decl = self.classes.get(&class_name)?;
            if let Some(found) = decl.methods.get(method) {
                let subst = Self::param_substitution(&decl.type_params, &class_args);
                return Some(MethodDecl {
                    type_params: found.type_params.clone(),
                    ty: subst.apply(&found.ty),
                    loc: found.loc,
                });
            }
            current = match self.superclass_of(&class_name, &class_args) {
                Some(ty) => match ty.kind {
                    crate::types::TypeKind::Nominal {
                        name: super_name,
                        args: super_args,
                        ..
                    } => Some((super_name, super_args)),
                    _ => None,
                },
                None => None,
            };
        }
        None
    }

    /// Methods an interface application demands, instantiated with `args`.
    pub fn interface_methods(&self, name: &str, args: &[Type]) -> Option<Vec<(String, MethodDecl)>> {
        let decl = self.interfaces.get(name)?;
        let subst = Self::param_substitution(&decl.type_params, args);
        Some(
            decl.methods
                .iter()
                .map(|(method_name, method)| {
                    (
                        method_name.clone(),
                        MethodDecl {
                            type_params: method.type_params.clone(),
                            ty: subst.apply(&method.ty),
                            loc: method.loc,
                        },
                    )
                })
                .collect(),
        )
    }

    /// Iterate all declared names (for completion).
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.classes
            .keys()
            .chain(self.interfaces.keys())
            .chain(self.aliases.keys())
    }

    /// Location of the declaration of `name`, if any.
    pub fn decl_loc(&self, name: &str) -> Option<Span> {
        if let Some(decl) = self.classes.get(name) {
            return decl.loc;
        }
        if let Some(decl) = self.interfaces.get(name) {
            return decl.loc;
        }
        self.aliases.get(name).and_then(|d| d.loc)
    }
}
