//! Queries backing the interaction worker: hover, completion, and
//! go-to-definition over signature files.

use std::path::{Path, PathBuf};

use steep_common::{Position, Range};
use steep_syntax::token::{Scanner, TokenKind};
use steep_syntax::{Decl, MethodDef};

use crate::loader::{CheckService, qualify};

impl CheckService {
    /// The declaration or method signature under a position, rendered for
    /// a hover popup.
    pub fn hover(&self, path: &Path, position: Position) -> Option<String> {
        let file = self.file(path)?;
        let offset = file.line_map.position_to_offset(position, &file.source)?;

        for decl in &file.decls {
            match decl {
                Decl::Class(def) => {
                    if let Some(text) = self.hover_method(&def.methods, offset, |name| {
                        self.env()
                            .class_decl(&qualify(&def.name))
                            .and_then(|c| c.methods.get(name))
                            .map(|m| m.ty.to_string())
                    }) {
                        return Some(text);
                    }
                    if def.name_span.contains(offset) {
                        return Some(format!("class {}", qualify(&def.name)));
                    }
                }
                Decl::Interface(def) => {
                    if let Some(text) = self.hover_method(&def.methods, offset, |name| {
                        self.env()
                            .interface_decl(&qualify(&def.name))
                            .and_then(|i| i.methods.get(name))
                            .map(|m| m.ty.to_string())
                    }) {
                        return Some(text);
                    }
                    if def.name_span.contains(offset) {
                        return Some(format!("interface {}", qualify(&def.name)));
                    }
                }
                Decl::Alias(def) => {
                    if def.name_span.contains(offset) {
                        let body = self
                            .env()
                            .alias_decl(&qualify(&def.name))
                            .map(|a| a.body.to_string())
                            .unwrap_or_default();
                        return Some(format!("type {} = {body}", qualify(&def.name)));
                    }
                }
            }
        }
        None
    }

    fn hover_method(
        &self,
        methods: &[MethodDef],
        offset: u32,
        resolved: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        for method in methods {
            if method.span.contains(offset) {
                let ty = resolved(&method.name)?;
                return Some(format!("def {}: {ty}", method.name));
            }
        }
        None
    }

    /// Every declared name, for completion. Sorted for deterministic
    /// responses.
    pub fn completion(&self) -> Vec<String> {
        let mut names: Vec<String> = self.env().names().cloned().collect();
        names.sort();
        names
    }

    /// The declaration site of the name under a position.
    pub fn definition(&self, path: &Path, position: Position) -> Option<(PathBuf, Range)> {
        let file = self.file(path)?;
        let offset = file.line_map.position_to_offset(position, &file.source)?;

        let token = Scanner::new(&file.source)
            .tokenize()
            .into_iter()
            .find(|t| t.kind == TokenKind::Ident && t.span.contains(offset))?;

        let (decl_path, span) = self.decl_location(&qualify(&token.text))?;
        let decl_file = self.file(decl_path)?;
        let range = decl_file.line_map.span_to_range(*span, &decl_file.source);
        Some((decl_path.clone(), range))
    }
}
