//! Macro invocation detection from Rust AST.
//!
//! Three kinds of use sites are counted:
//! - Bang invocations: `foo!(..)` in expression, statement, item, pattern
//!   and type position. `macro_rules!` definitions are not invocations.
//! - Derive invocations: each path listed in `#[derive(..)]`, including
//!   derives behind `#[cfg_attr(.., derive(..))]`.
//! - Attribute invocations: outer attributes on items, impl items, trait
//!   items and foreign items that are neither built-in/tool attributes nor
//!   derive helpers.
//!
//! Macro calls nested inside another macro's token stream are opaque without
//! expansion: `println!("{}", format!(".."))` counts one invocation.

use std::path::Path;

use syn::punctuated::Punctuated;
use syn::{
    visit::Visit, AttrStyle, Attribute, File, ForeignItem, ImplItem, Item, ItemMacro, Macro, Meta,
    Token, TraitItem,
};

use crate::analyzis::{AttributeMacroUsage, DeriveMacroUsage};
use crate::error::{MacrostatError, MacrostatResult};

/// Attributes provided by the compiler itself. Never macro invocations.
const BUILTIN_ATTRIBUTES: &[&str] = &[
    "allow",
    "automatically_derived",
    "bench",
    "cfg",
    "cfg_attr",
    "cold",
    "collapse_debuginfo",
    "coverage",
    "crate_name",
    "crate_type",
    "debugger_visualizer",
    "deny",
    "deprecated",
    "derive",
    "doc",
    "expect",
    "export_name",
    "feature",
    "forbid",
    "global_allocator",
    "ignore",
    "inline",
    "instruction_set",
    "link",
    "link_name",
    "link_ordinal",
    "link_section",
    "macro_export",
    "macro_use",
    "must_use",
    "naked",
    "no_builtins",
    "no_implicit_prelude",
    "no_link",
    "no_main",
    "no_mangle",
    "no_std",
    "non_exhaustive",
    "optimize",
    "panic_handler",
    "path",
    "proc_macro",
    "proc_macro_attribute",
    "proc_macro_derive",
    "recursion_limit",
    "register_tool",
    "repr",
    "should_panic",
    "target_feature",
    "test",
    "test_runner",
    "track_caller",
    "type_length_limit",
    "unsafe",
    "used",
    "warn",
    "windows_subsystem",
];

/// Namespaces of tool attributes such as `#[rustfmt::skip]`.
const TOOL_NAMESPACES: &[&str] = &["clippy", "diagnostic", "rust_analyzer", "rustdoc", "rustfmt"];

/// Macro use sites found in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroUsageResult {
    /// `foo!(..)` style invocations
    pub bang_invocations: usize,
    pub derive_usage: DeriveMacroUsage,
    pub attribute_usage: AttributeMacroUsage,
}

impl MacroUsageResult {
    pub fn derive_invocations(&self) -> usize {
        self.derive_usage.total()
    }

    pub fn attribute_invocations(&self) -> usize {
        self.attribute_usage.total()
    }

    /// Invocations of every kind.
    pub fn total_invocations(&self) -> usize {
        self.bang_invocations + self.derive_invocations() + self.attribute_invocations()
    }
}

/// Render a path the way it was written: `serde::Serialize`, `::tokio::main`.
pub fn path_to_string(path: &syn::Path) -> String {
    let joined = path
        .segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect::<Vec<_>>()
        .join("::");
    if path.leading_colon.is_some() {
        format!("::{}", joined)
    } else {
        joined
    }
}

/// Whether an attribute path names a built-in or tool attribute.
pub fn is_builtin_attribute(path: &syn::Path) -> bool {
    let Some(first) = path.segments.first() else {
        return true;
    };
    let first = first.ident.to_string();

    if path.segments.len() > 1 {
        return TOOL_NAMESPACES.contains(&first.as_str());
    }

    first.starts_with("rustc_") || BUILTIN_ATTRIBUTES.contains(&first.as_str())
}

/// Attribute metas taking effect on an item, in source order: plain
/// attributes plus the ones wrapped in `cfg_attr(predicate, attr, ..)` at any
/// depth. Conditions are not evaluated.
fn effective_metas(attrs: &[Attribute]) -> Vec<Meta> {
    let mut metas = Vec::with_capacity(attrs.len());
    for attr in attrs {
        if !matches!(attr.style, AttrStyle::Outer) {
            continue;
        }
        push_effective(attr.meta.clone(), &mut metas);
    }
    metas
}

fn push_effective(meta: Meta, metas: &mut Vec<Meta>) {
    match meta {
        Meta::List(list) if list.path.is_ident("cfg_attr") => {
            if let Ok(inner) =
                list.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)
            {
                // first entry is the predicate
                for meta in inner.into_iter().skip(1) {
                    push_effective(meta, metas);
                }
            }
        }
        meta => metas.push(meta),
    }
}

fn is_derive(meta: &Meta) -> bool {
    meta.path().is_ident("derive")
}

fn derive_paths(meta: &Meta) -> Vec<syn::Path> {
    match meta {
        Meta::List(list) => list
            .parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
            .map(|paths| paths.into_iter().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

struct MacroUsageExtractor {
    result: MacroUsageResult,
}

impl MacroUsageExtractor {
    fn new() -> Self {
        Self {
            result: MacroUsageResult::default(),
        }
    }

    /// Count derives and attribute macros on a declaration.
    ///
    /// `derive_target` marks structs, enums and unions: there, a non-builtin
    /// attribute written after a `#[derive]` is a helper of that derive.
    /// Attributes before the first derive are attribute macros.
    fn record_attrs(&mut self, attrs: &[Attribute], derive_target: bool) {
        let mut after_derive = false;

        for meta in &effective_metas(attrs) {
            if is_derive(meta) {
                for path in derive_paths(meta) {
                    self.result.derive_usage.add(path_to_string(&path), 1);
                }
                after_derive = true;
                continue;
            }

            let path = meta.path();
            if is_builtin_attribute(path) || (derive_target && after_derive) {
                continue;
            }
            self.result.attribute_usage.add(path_to_string(path), 1);
        }
    }
}

fn item_attrs(item: &Item) -> Option<(&[Attribute], bool)> {
    let attrs = match item {
        Item::Const(i) => &i.attrs,
        Item::Enum(i) => return Some((&i.attrs, true)),
        Item::ExternCrate(i) => &i.attrs,
        Item::Fn(i) => &i.attrs,
        Item::ForeignMod(i) => &i.attrs,
        Item::Impl(i) => &i.attrs,
        Item::Macro(i) => &i.attrs,
        Item::Mod(i) => &i.attrs,
        Item::Static(i) => &i.attrs,
        Item::Struct(i) => return Some((&i.attrs, true)),
        Item::Trait(i) => &i.attrs,
        Item::TraitAlias(i) => &i.attrs,
        Item::Type(i) => &i.attrs,
        Item::Union(i) => return Some((&i.attrs, true)),
        Item::Use(i) => &i.attrs,
        _ => return None,
    };
    Some((attrs, false))
}

impl<'ast> Visit<'ast> for MacroUsageExtractor {
    fn visit_macro(&mut self, mac: &'ast Macro) {
        self.result.bang_invocations += 1;
        syn::visit::visit_macro(self, mac);
    }

    fn visit_item_macro(&mut self, item: &'ast ItemMacro) {
        // `macro_rules! name { .. }` defines a macro, it does not call one
        if item.ident.is_some() {
            return;
        }
        syn::visit::visit_item_macro(self, item);
    }

    fn visit_item(&mut self, item: &'ast Item) {
        if let Some((attrs, derive_target)) = item_attrs(item) {
            self.record_attrs(attrs, derive_target);
        }
        syn::visit::visit_item(self, item);
    }

    fn visit_impl_item(&mut self, item: &'ast ImplItem) {
        let attrs = match item {
            ImplItem::Const(i) => Some(&i.attrs),
            ImplItem::Fn(i) => Some(&i.attrs),
            ImplItem::Type(i) => Some(&i.attrs),
            ImplItem::Macro(i) => Some(&i.attrs),
            _ => None,
        };
        if let Some(attrs) = attrs {
            self.record_attrs(attrs, false);
        }
        syn::visit::visit_impl_item(self, item);
    }

    fn visit_trait_item(&mut self, item: &'ast TraitItem) {
        let attrs = match item {
            TraitItem::Const(i) => Some(&i.attrs),
            TraitItem::Fn(i) => Some(&i.attrs),
            TraitItem::Type(i) => Some(&i.attrs),
            TraitItem::Macro(i) => Some(&i.attrs),
            _ => None,
        };
        if let Some(attrs) = attrs {
            self.record_attrs(attrs, false);
        }
        syn::visit::visit_trait_item(self, item);
    }

    fn visit_foreign_item(&mut self, item: &'ast ForeignItem) {
        let attrs = match item {
            ForeignItem::Fn(i) => Some(&i.attrs),
            ForeignItem::Static(i) => Some(&i.attrs),
            ForeignItem::Type(i) => Some(&i.attrs),
            ForeignItem::Macro(i) => Some(&i.attrs),
            _ => None,
        };
        if let Some(attrs) = attrs {
            self.record_attrs(attrs, false);
        }
        syn::visit::visit_foreign_item(self, item);
    }
}

/// Extract macro use sites from a parsed file.
pub fn extract_macro_usages_from_ast(ast: &File) -> MacroUsageResult {
    let mut extractor = MacroUsageExtractor::new();
    extractor.visit_file(ast);
    extractor.result
}

/// Extract macro use sites from file content.
///
/// On parse error, logs a warning and returns an empty result.
pub fn extract_macro_usages(path: &Path, content: &str) -> MacroUsageResult {
    match extract_macro_usages_strict(path, content) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "AST parse failed");
            MacroUsageResult::default()
        }
    }
}

/// Like [`extract_macro_usages`] but returns the parse error.
pub fn extract_macro_usages_strict(path: &Path, content: &str) -> MacrostatResult<MacroUsageResult> {
    let ast = syn::parse_file(content).map_err(|e| MacrostatError::from_syn(path, &e))?;
    Ok(extract_macro_usages_from_ast(&ast))
}
