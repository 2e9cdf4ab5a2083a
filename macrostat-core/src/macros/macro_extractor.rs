//! Macro definition extraction from Rust AST.
//!
//! Recognised definitions:
//! - `macro_rules! name { .. }` and `macro name(..) { .. }` (declarative)
//! - `#[proc_macro] fn` (function-like procedural)
//! - `#[proc_macro_derive(Name)] fn` (derive)
//! - `#[proc_macro_attribute] fn` (attribute)
//!
//! Definitions inside inline modules are found and tagged with their module path.

use serde::{Deserialize, Serialize};
use std::path::Path;
use syn::{visit::Visit, Attribute, File, Item, ItemFn, ItemMacro, ItemMod};

use crate::error::{MacrostatError, MacrostatResult};

/// Kind of macro a definition introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroKind {
    Declarative,
    Procedural,
    Derive,
    Attribute,
}

impl std::fmt::Display for MacroKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declarative => write!(f, "declarative"),
            Self::Procedural => write!(f, "procedural"),
            Self::Derive => write!(f, "derive"),
            Self::Attribute => write!(f, "attribute"),
        }
    }
}

/// Information about a macro definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDef {
    /// Name the macro is invoked by (for derives, the derive name rather than
    /// the function name)
    pub name: String,
    pub kind: MacroKind,
    /// `#[macro_export]` for declarative macros; procedural macros are
    /// always exported
    pub exported: bool,
    /// Source file path
    pub file: String,
    /// Module path (for nested macros)
    pub module_path: String,
}

struct MacroExtractor {
    file_path: String,
    results: Vec<MacroDef>,
    current_mod: Vec<String>,
}

impl MacroExtractor {
    fn new(file_path: String) -> Self {
        Self {
            file_path,
            results: Vec::with_capacity(8),
            current_mod: Vec::new(),
        }
    }

    fn has_attr(attrs: &[Attribute], name: &str) -> bool {
        attrs.iter().any(|a| a.path().is_ident(name))
    }

    fn record(&mut self, name: String, kind: MacroKind, exported: bool) {
        self.results.push(MacroDef {
            name,
            kind,
            exported,
            file: self.file_path.clone(),
            module_path: self.current_mod.join("::"),
        });
    }

    fn record_proc_macro_fn(&mut self, func: &ItemFn) {
        let fn_name = func.sig.ident.to_string();
        for attr in &func.attrs {
            let path = attr.path();
            if path.is_ident("proc_macro") {
                self.record(fn_name.clone(), MacroKind::Procedural, true);
            } else if path.is_ident("proc_macro_attribute") {
                self.record(fn_name.clone(), MacroKind::Attribute, true);
            } else if path.is_ident("proc_macro_derive") {
                // #[proc_macro_derive(Name, attributes(helper))]: the first
                // argument is the derive name
                let name = derive_name(attr).unwrap_or_else(|| fn_name.clone());
                self.record(name, MacroKind::Derive, true);
            }
        }
    }
}

/// First path argument of `#[proc_macro_derive(...)]`.
fn derive_name(attr: &Attribute) -> Option<String> {
    let mut name = None;
    // Only the leading ident matters; later arguments are skipped.
    let _ = attr.parse_nested_meta(|meta| {
        if name.is_none() {
            name = meta.path.get_ident().map(|i| i.to_string());
        }
        if meta.input.peek(syn::token::Paren) {
            let content;
            syn::parenthesized!(content in meta.input);
            content.parse::<proc_macro2::TokenStream>()?;
        }
        Ok(())
    });
    name
}

/// Name of a `macro name(...) {}` item, which syn keeps as verbatim tokens.
fn decl_macro_name(tokens: &proc_macro2::TokenStream) -> Option<String> {
    let mut iter = tokens.clone().into_iter().skip_while(|tt| {
        // skip a leading visibility such as `pub` or `pub(crate)`
        matches!(tt, proc_macro2::TokenTree::Ident(i) if i == "pub")
            || matches!(tt, proc_macro2::TokenTree::Group(g) if g.delimiter() == proc_macro2::Delimiter::Parenthesis)
    });
    match (iter.next(), iter.next()) {
        (Some(proc_macro2::TokenTree::Ident(kw)), Some(proc_macro2::TokenTree::Ident(name)))
            if kw == "macro" =>
        {
            Some(name.to_string())
        }
        _ => None,
    }
}

impl<'ast> Visit<'ast> for MacroExtractor {
    fn visit_item(&mut self, item: &'ast Item) {
        match item {
            Item::Macro(ItemMacro {
                ident: Some(id),
                attrs,
                ..
            }) => {
                self.record(
                    id.to_string(),
                    MacroKind::Declarative,
                    Self::has_attr(attrs, "macro_export"),
                );
            }

            Item::Verbatim(tokens) => {
                if let Some(name) = decl_macro_name(tokens) {
                    // `pub macro` is as exported as a decl macro gets
                    let exported = tokens
                        .clone()
                        .into_iter()
                        .next()
                        .is_some_and(|tt| tt.to_string() == "pub");
                    self.record(name, MacroKind::Declarative, exported);
                }
            }

            Item::Fn(func) => self.record_proc_macro_fn(func),

            Item::Mod(ItemMod {
                ident,
                content: Some((_, items)),
                ..
            }) => {
                self.current_mod.push(ident.to_string());
                for i in items {
                    self.visit_item(i);
                }
                self.current_mod.pop();
                return;
            }

            _ => {}
        }

        syn::visit::visit_item(self, item);
    }
}

/// Extract all macro definitions from a parsed file.
pub fn extract_macros_from_ast(path: &Path, ast: &File) -> Vec<MacroDef> {
    let mut extractor = MacroExtractor::new(path.display().to_string());
    extractor.visit_file(ast);
    extractor.results
}

/// Extract all macro definitions from file content.
///
/// On parse error, logs a warning and returns an empty list.
pub fn extract_macros(path: &Path, content: &str) -> Vec<MacroDef> {
    match extract_macros_strict(path, content) {
        Ok(defs) => defs,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "AST parse failed");
            Vec::new()
        }
    }
}

/// Like [`extract_macros`] but returns the parse error.
pub fn extract_macros_strict(path: &Path, content: &str) -> MacrostatResult<Vec<MacroDef>> {
    let ast = syn::parse_file(content).map_err(|e| MacrostatError::from_syn(path, &e))?;
    Ok(extract_macros_from_ast(path, &ast))
}
