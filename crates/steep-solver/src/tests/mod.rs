//! Unit tests for the solver crate.

mod intersection_union_tests;
mod solve_tests;
mod subtype_tests;

use crate::environment::{ClassDecl, InterfaceDecl, MethodDecl, TypeEnv, TypeParam};
use crate::types::Type;
use indexmap::IndexMap;

pub(crate) fn integer() -> Type {
    Type::instance("::Integer", vec![])
}

pub(crate) fn float() -> Type {
    Type::instance("::Float", vec![])
}

pub(crate) fn numeric() -> Type {
    Type::instance("::Numeric", vec![])
}

pub(crate) fn string() -> Type {
    Type::instance("::String", vec![])
}

pub(crate) fn array(elem: Type) -> Type {
    Type::instance("::Array", vec![elem])
}

pub(crate) fn method(ty: Type) -> MethodDecl {
    MethodDecl {
        type_params: vec![],
        ty,
        loc: None,
    }
}

/// An environment with a small user hierarchy on top of the core:
/// `::Animal < ::Object`, `::Cat < ::Animal`, and an `::_Each[A]`
/// interface demanding `each: () -> ::Array[A]`.
pub(crate) fn test_env() -> TypeEnv {
    let mut env = TypeEnv::core();

    let mut animal_methods = IndexMap::new();
    animal_methods.insert(
        "name".to_string(),
        method(Type::proc(vec![], vec![], string())),
    );
    env.insert_class(ClassDecl {
        name: "::Animal".to_string(),
        type_params: vec![],
        superclass: Some(Type::instance("::Object", vec![])),
        methods: animal_methods,
        loc: None,
    });

    let mut cat_methods = IndexMap::new();
    cat_methods.insert(
        "meow".to_string(),
        method(Type::proc(vec![], vec![], string())),
    );
    env.insert_class(ClassDecl {
        name: "::Cat".to_string(),
        type_params: vec![],
        superclass: Some(Type::instance("::Animal", vec![])),
        methods: cat_methods,
        loc: None,
    });

    let mut each_methods = IndexMap::new();
    each_methods.insert(
        "each".to_string(),
        method(Type::proc(vec![], vec![], array(Type::var("A")))),
    );
    env.insert_interface(InterfaceDecl {
        name: "::_Each".to_string(),
        type_params: vec![TypeParam::invariant("A")],
        methods: each_methods,
        loc: None,
    });

    env
}
