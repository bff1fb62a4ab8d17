//! Signature environment loading.
//!
//! Loading is two-phase. The first pass parses every file and records
//! each declared name with its kind and arity; the second builds the
//! [`TypeEnv`], resolving type expressions against that table (names
//! bound by the enclosing declaration's type parameters become variables,
//! everything else a nominal). Duplicate definitions keep the first
//! declaration and record the later one for diagnostics.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use steep_common::{LineMap, Span};
use steep_solver::{
    AliasDecl, ClassDecl, InterfaceDecl, MethodDecl, Type, TypeEnv, TypeParam, Variance,
};
use steep_syntax::ast::VarianceDef;
use steep_syntax::{Decl, MethodDef, ParseError, TypeExpr, TypeExprKind, TypeParamDef, parse_file};
use tracing::{debug, info};

use crate::project::Project;

/// A parsed signature file.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub source: String,
    pub line_map: LineMap,
    pub decls: Vec<Decl>,
    pub parse_error: Option<ParseError>,
}

/// A later definition of an already-taken name.
#[derive(Clone, Debug)]
pub struct Duplicate {
    pub path: PathBuf,
    pub span: Span,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclKind {
    Class,
    Interface,
    Alias,
}

/// Name table built in the first pass: qualified name -> kind.
#[derive(Clone, Debug, Default)]
pub struct NameTable {
    kinds: FxHashMap<String, DeclKind>,
}

impl NameTable {
    fn from_env(env: &TypeEnv) -> Self {
        let mut table = NameTable::default();
        for name in env.names() {
            let kind = if env.interface_decl(name).is_some() {
                DeclKind::Interface
            } else if env.alias_decl(name).is_some() {
                DeclKind::Alias
            } else {
                DeclKind::Class
            };
            table.kinds.insert(name.clone(), kind);
        }
        table
    }

    fn insert(&mut self, name: String, kind: DeclKind) -> bool {
        if self.kinds.contains_key(&name) {
            return false;
        }
        self.kinds.insert(name, kind);
        true
    }

    pub fn kind_of(&self, name: &str) -> Option<DeclKind> {
        self.kinds.get(name).copied()
    }
}

/// The signature environment with its source files, shared by every
/// worker kind: code workers validate files against it, the interaction
/// worker answers queries from it.
#[derive(Clone, Debug)]
pub struct CheckService {
    files: BTreeMap<PathBuf, SourceFile>,
    env: TypeEnv,
    table: NameTable,
    duplicates: Vec<Duplicate>,
    decl_locations: FxHashMap<String, (PathBuf, Span)>,
}

impl CheckService {
    /// Load every signature file of a project from disk.
    pub fn load(project: &Project) -> io::Result<CheckService> {
        let mut sources = Vec::new();
        for path in project.signature_files() {
            let source = std::fs::read_to_string(&path)?;
            sources.push((path, source));
        }
        info!(files = sources.len(), "loaded signature files");
        Ok(CheckService::from_sources(sources))
    }

    /// Build a service from in-memory sources.
    pub fn from_sources(sources: Vec<(PathBuf, String)>) -> CheckService {
        let mut service = CheckService {
            files: BTreeMap::new(),
            env: TypeEnv::core(),
            table: NameTable::default(),
            duplicates: Vec::new(),
            decl_locations: FxHashMap::default(),
        };
        for (path, source) in sources {
            service.insert_source(path, source);
        }
        service.rebuild();
        service
    }

    fn insert_source(&mut self, path: PathBuf, source: String) {
        let (decls, parse_error) = match parse_file(&source) {
            Ok(decls) => (decls, None),
            Err(error) => (Vec::new(), Some(error)),
        };
        let line_map = LineMap::build(&source);
        self.files.insert(
            path.clone(),
            SourceFile {
                path,
                source,
                line_map,
                decls,
                parse_error,
            },
        );
    }

    /// Replace the content of one file (editor overlay) and rebuild the
    /// environment. Re-checking is whole-file, so a full rebuild keeps
    /// the environment consistent with every open overlay.
    pub fn update_file(&mut self, path: PathBuf, source: String) {
        debug!(path = %path.display(), "updating signature file");
        self.insert_source(path, source);
        self.rebuild();
    }

    pub fn env(&self) -> &TypeEnv {
        &self.env
    }

    pub fn table(&self) -> &NameTable {
        &self.table
    }

    pub fn file(&self, path: &Path) -> Option<&SourceFile> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    pub fn duplicates(&self) -> &[Duplicate] {
        &self.duplicates
    }

    pub fn decl_location(&self, name: &str) -> Option<&(PathBuf, Span)> {
        self.decl_locations.get(name)
    }

    // =========================================================================
    // Environment Construction
    // =========================================================================

    fn rebuild(&mut self) {
        self.env = TypeEnv::core();
        self.table = NameTable::from_env(&self.env);
        self.duplicates = Vec::new();
        self.decl_locations = FxHashMap::default();

        // First pass: claim names in file order.
        for file in self.files.values() {
            for decl in &file.decls {
                let qualified = qualify(decl.name());
                let kind = match decl {
                    Decl::Class(_) => DeclKind::Class,
                    Decl::Interface(_) => DeclKind::Interface,
                    Decl::Alias(_) => DeclKind::Alias,
                };
                if self.table.insert(qualified.clone(), kind) {
                    self.decl_locations
                        .insert(qualified, (file.path.clone(), decl.name_span()));
                } else {
                    self.duplicates.push(Duplicate {
                        path: file.path.clone(),
                        span: decl.name_span(),
                        name: qualified,
                    });
                }
            }
        }

        // Second pass: resolve declarations into the environment. Later
        // duplicates fail `insert_*` and are simply skipped.
        let files: Vec<_> = self.files.values().cloned().collect();
        for file in &files {
            for decl in &file.decls {
                match decl {
                    Decl::Class(def) => {
                        let scope: Vec<String> =
                            def.type_params.iter().map(|p| p.name.clone()).collect();
                        let superclass = match &def.superclass {
                            Some(expr) => self.resolve(expr, &scope),
                            None => Type::instance("::Object", vec![]),
                        };
                        let decl = ClassDecl {
                            name: qualify(&def.name),
                            type_params: type_params(&def.type_params),
                            superclass: Some(superclass),
                            methods: self.resolve_methods(&def.methods, &scope),
                            loc: Some(def.name_span),
                        };
                        self.env.insert_class(decl);
                    }
                    Decl::Interface(def) => {
                        let scope: Vec<String> =
                            def.type_params.iter().map(|p| p.name.clone()).collect();
                        let decl = InterfaceDecl {
                            name: qualify(&def.name),
                            type_params: type_params(&def.type_params),
                            methods: self.resolve_methods(&def.methods, &scope),
                            loc: Some(def.name_span),
                        };
                        self.env.insert_interface(decl);
                    }
                    Decl::Alias(def) => {
                        let scope: Vec<String> =
                            def.type_params.iter().map(|p| p.name.clone()).collect();
                        let decl = AliasDecl {
                            name: qualify(&def.name),
                            type_params: type_params(&def.type_params),
                            body: self.resolve(&def.body, &scope),
                            loc: Some(def.name_span),
                        };
                        self.env.insert_alias(decl);
                    }
                }
            }
        }
    }

    fn resolve_methods(
        &self,
        methods: &[MethodDef],
        class_scope: &[String],
    ) -> IndexMap<String, MethodDecl> {
        let mut out = IndexMap::new();
        for method in methods {
            let mut scope = class_scope.to_vec();
            scope.extend(method.type_params.iter().cloned());
            out.insert(
                method.name.clone(),
                MethodDecl {
                    type_params: method.type_params.clone(),
                    ty: self.resolve(&method.ty, &scope),
                    loc: Some(method.name_span),
                },
            );
        }
        out
    }

    /// Resolve a syntax-level type expression to a solver type.
    pub fn resolve(&self, expr: &TypeExpr, scope: &[String]) -> Type {
        let ty = match &expr.kind {
            TypeExprKind::Name { name, args } => {
                if args.is_empty() && scope.iter().any(|s| s == name) {
                    Type::var(name.clone())
                } else {
                    let qualified = qualify(name);
                    let args = args.iter().map(|a| self.resolve(a, scope)).collect();
                    match self.table.kind_of(&qualified) {
                        Some(DeclKind::Interface) => Type::interface(qualified, args),
                        Some(DeclKind::Alias) => Type::alias(qualified, args),
                        // Unknown names resolve as instances; validation
                        // reports them against the AST where the span is.
                        Some(DeclKind::Class) | None => Type::instance(qualified, args),
                    }
                }
            }
            TypeExprKind::Singleton { name } => Type::class(qualify(name), vec![]),
            TypeExprKind::Top => Type::top(),
            TypeExprKind::Bot => Type::bot(),
            TypeExprKind::Any => Type::any(),
            TypeExprKind::SelfType => Type::var("self"),
            TypeExprKind::Union(members) => {
                Type::union(members.iter().map(|m| self.resolve(m, scope)).collect())
            }
            TypeExprKind::Intersection(members) => {
                Type::intersection(members.iter().map(|m| self.resolve(m, scope)).collect())
            }
            TypeExprKind::Tuple(elems) => {
                Type::tuple(elems.iter().map(|e| self.resolve(e, scope)).collect())
            }
            TypeExprKind::Record(fields) => Type::record(
                fields
                    .iter()
                    .map(|(k, t)| (k.clone(), self.resolve(t, scope)))
                    .collect(),
            ),
            TypeExprKind::Proc {
                params,
                keywords,
                ret,
            } => Type::proc(
                params.iter().map(|p| self.resolve(p, scope)).collect(),
                keywords
                    .iter()
                    .map(|(k, t)| (k.clone(), self.resolve(t, scope)))
                    .collect(),
                self.resolve(ret, scope),
            ),
        };
        ty.with_loc(expr.span)
    }
}

/// Signature files name types unqualified; the environment keys them with
/// the `::` prefix.
pub fn qualify(name: &str) -> String {
    format!("::{name}")
}

fn type_params(defs: &[TypeParamDef]) -> Vec<TypeParam> {
    defs.iter()
        .map(|def| TypeParam {
            name: def.name.clone(),
            variance: match def.variance {
                VarianceDef::Invariant => Variance::Invariant,
                VarianceDef::Covariant => Variance::Covariant,
                VarianceDef::Contravariant => Variance::Contravariant,
            },
        })
        .collect()
}
