//! Concretization: binding a change template's free names at a location.
//!
//! Materials are collected once per file: fields, locals and parameters with
//! the scope that declares them, methods, and known types. A template's free
//! names are the value-carrying names it does not declare itself. Each one is
//! bound to a visible material whose type is compatible with the type the
//! name had where the template was mined.
//!
//! ## Type compatibility
//!
//! Both strategies accept an unknown type on either side and identical types
//! after dropping generic arguments and package qualification.
//! `TypeCompatible` additionally accepts primitive widening, boxing and
//! unboxing (optionally followed by widening), `null` for any reference type,
//! anything for `Object`, and subtyping through supertypes declared in the
//! same file. `ExactType` accepts nothing more.
//!
//! ## Attempts
//!
//! `instantiate` is a pure function of (change, location, materials,
//! attempt). Candidates per name are ordered identity first, then nearest
//! declaration first; attempt `k` selects the `k`-th injective assignment in
//! that order.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::change::{Change, ChangeKind};
use crate::frontend::{kinds, slots};
use crate::location::TargetLocation;
use crate::rewrite::{splice, TextEdit};
use crate::tree::{Category, NodeId, Role, Tree};
use crate::types::Span;

/// Upper bound on assignments examined while looking for the `k`-th one.
const MAX_BINDING_STEPS: usize = 100_000;

// ============================================================================
// Strategy and Type Rules
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConcretizationStrategy {
    #[default]
    #[serde(alias = "tc")]
    TypeCompatible,
    #[serde(alias = "exact")]
    ExactType,
}

impl ConcretizationStrategy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tc" | "type-compatible" => Some(ConcretizationStrategy::TypeCompatible),
            "exact" | "exact-type" => Some(ConcretizationStrategy::ExactType),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConcretizationStrategy::TypeCompatible => "tc",
            ConcretizationStrategy::ExactType => "exact",
        }
    }
}

const WIDENING: &[(&str, &[&str])] = &[
    ("byte", &["short", "int", "long", "float", "double"]),
    ("short", &["int", "long", "float", "double"]),
    ("char", &["int", "long", "float", "double"]),
    ("int", &["long", "float", "double"]),
    ("long", &["float", "double"]),
    ("float", &["double"]),
];

const BOXING: &[(&str, &str)] = &[
    ("boolean", "Boolean"),
    ("byte", "Byte"),
    ("short", "Short"),
    ("char", "Character"),
    ("int", "Integer"),
    ("long", "Long"),
    ("float", "Float"),
    ("double", "Double"),
];

pub fn is_primitive(ty: &str) -> bool {
    BOXING.iter().any(|(p, _)| *p == ty)
}

/// Drop generic arguments and package qualification: `java.util.List<T>`
/// becomes `List`, `a.B[]` becomes `B[]`.
pub fn normalize_type(ty: &str) -> String {
    let mut base = String::new();
    let mut depth = 0usize;
    for c in ty.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            c if depth == 0 && !c.is_whitespace() => base.push(c),
            _ => {}
        }
    }
    let dims = base.matches("[]").count();
    let stem = base.trim_end_matches("[]");
    let simple = stem.rsplit('.').next().unwrap_or(stem);
    format!("{}{}", simple, "[]".repeat(dims))
}

fn widens(from: &str, to: &str) -> bool {
    WIDENING
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

fn boxed(primitive: &str) -> Option<&'static str> {
    BOXING.iter().find(|(p, _)| *p == primitive).map(|(_, b)| *b)
}

fn unboxed(reference: &str) -> Option<&'static str> {
    BOXING.iter().find(|(_, b)| *b == reference).map(|(p, _)| *p)
}

impl ConcretizationStrategy {
    /// Whether a value of type `actual` may stand where `expected` is needed.
    pub fn compatible(
        &self,
        expected: Option<&str>,
        actual: Option<&str>,
        supertypes: &BTreeMap<String, Vec<String>>,
    ) -> bool {
        let (Some(expected), Some(actual)) = (expected, actual) else {
            return true;
        };
        let e = normalize_type(expected);
        let a = normalize_type(actual);
        if e == a {
            return true;
        }
        if *self == ConcretizationStrategy::ExactType {
            return false;
        }
        if a == "null" {
            return !is_primitive(&e);
        }
        if e == "Object" {
            return true;
        }
        if widens(&a, &e) || boxed(&a) == Some(e.as_str()) {
            return true;
        }
        if let Some(p) = unboxed(&a) {
            if p == e || widens(p, &e) {
                return true;
            }
        }
        is_subtype(&a, &e, supertypes)
    }
}

fn is_subtype(sub: &str, sup: &str, supertypes: &BTreeMap<String, Vec<String>>) -> bool {
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack = vec![sub.to_string()];
    while let Some(ty) = stack.pop() {
        if !seen.insert(ty.clone()) {
            continue;
        }
        let parents = supertypes
            .iter()
            .filter(|(k, _)| normalize_type(k) == ty)
            .flat_map(|(_, v)| v.iter().map(|p| normalize_type(p)));
        for parent in parents {
            if parent == sup {
                return true;
            }
            stack.push(parent);
        }
    }
    false
}

// ============================================================================
// Materials
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Local,
    Param,
    Field,
}

/// A declared value that a free name may bind to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub name: String,
    pub ty: Option<String>,
    pub kind: MaterialKind,
    /// Offset of the declaring name.
    pub offset: usize,
    /// Scope node the declaration is visible in; `None` for fields.
    pub scope: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMaterial {
    pub name: String,
    pub return_type: Option<String>,
}

/// Everything declared in one file.
#[derive(Debug, Clone, Default)]
pub struct Materials {
    pub values: Vec<Material>,
    pub methods: Vec<MethodMaterial>,
    pub types: BTreeSet<String>,
    pub imports: Vec<String>,
    pub supertypes: BTreeMap<String, Vec<String>>,
}

impl Materials {
    /// Gather the file's declarations.
    pub fn collect(tree: &Tree, imports: Vec<String>) -> Self {
        let mut materials = Materials {
            imports,
            supertypes: tree.supertypes().clone(),
            ..Default::default()
        };
        if tree.is_empty() {
            return materials;
        }
        for id in tree.descendants(tree.root()) {
            let node = tree.node(id);
            if node.category == Category::Type {
                materials.types.insert(normalize_type(&node.value));
            }
            if !(node.declaration && node.is_name()) {
                continue;
            }
            match node.role {
                Some(Role::Field) => materials.values.push(Material {
                    name: node.value.clone(),
                    ty: node.declared_type.clone(),
                    kind: MaterialKind::Field,
                    offset: node.span.start,
                    scope: None,
                }),
                Some(Role::Variable) => {
                    let scope = tree.ancestors(id).find(|a| tree.node(*a).scope);
                    let kind = match scope {
                        Some(s) if tree.node(s).kind == kinds::METHOD_DECLARATION => {
                            MaterialKind::Param
                        }
                        _ => MaterialKind::Local,
                    };
                    materials.values.push(Material {
                        name: node.value.clone(),
                        ty: node.declared_type.clone(),
                        kind,
                        offset: node.span.start,
                        scope,
                    });
                }
                Some(Role::Method) | Some(Role::Constructor) => {
                    materials.methods.push(MethodMaterial {
                        name: node.value.clone(),
                        return_type: node.declared_type.clone(),
                    })
                }
                Some(Role::Type) => {
                    materials.types.insert(node.value.clone());
                }
                _ => {}
            }
        }
        materials
    }

    /// Values visible at `node`, nearest declaration first. Shadowed names
    /// appear once.
    pub fn visible_at(&self, tree: &Tree, node: NodeId) -> Vec<&Material> {
        let at = tree.node(node).span.start;
        let in_scope = |m: &&Material| match m.scope {
            None => true,
            Some(scope) => {
                (scope == node || tree.is_ancestor_of(scope, node))
                    && (m.kind == MaterialKind::Param || m.offset < at)
            }
        };
        let mut locals: Vec<&Material> = self
            .values
            .iter()
            .filter(|m| m.kind != MaterialKind::Field)
            .filter(in_scope)
            .collect();
        locals.sort_by(|a, b| b.offset.cmp(&a.offset));
        let fields = self.values.iter().filter(|m| m.kind == MaterialKind::Field);

        let mut seen: HashSet<&str> = HashSet::new();
        locals
            .into_iter()
            .chain(fields)
            .filter(|m| seen.insert(m.name.as_str()))
            .collect()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.name == name)
    }
}

// ============================================================================
// Instances
// ============================================================================

/// A concretized fragment ready to splice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Full payload text, including an elided statement terminator.
    pub text: String,
    /// Text of the payload root alone.
    pub expr_text: String,
    /// Final value of the payload root.
    pub value: String,
    /// Qualified names the fragment needs imported.
    pub imports: BTreeSet<String>,
    /// How the fragment was produced, for audit records.
    pub method: String,
    pub bindings: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotInstantiable;

/// A free name of a template and every node spelling it.
#[derive(Debug, Clone)]
struct FreeName {
    name: String,
    ty: Option<String>,
    nodes: Vec<NodeId>,
}

fn is_member_name(tree: &Tree, id: NodeId) -> bool {
    let node = tree.node(id);
    node.slot_is(kinds::METHOD_INVOCATION, slots::NAME) || node.slot_is("FieldAccess", slots::NAME)
}

fn free_names(payload: &Tree) -> Vec<FreeName> {
    let all = payload.descendants(payload.root());
    let declared: HashSet<&str> = all
        .iter()
        .map(|id| payload.node(*id))
        .filter(|n| n.declaration && n.is_name())
        .map(|n| n.value.as_str())
        .collect();
    let mut out: Vec<FreeName> = Vec::new();
    for id in all {
        let node = payload.node(id);
        if !node.is_name() || node.declaration || is_member_name(payload, id) {
            continue;
        }
        let value_like = match node.role {
            Some(Role::Variable) | Some(Role::Field) => true,
            Some(Role::Unresolved) => node.value.starts_with(|c: char| c.is_lowercase()),
            _ => false,
        };
        if !value_like || declared.contains(node.value.as_str()) || node.value_spans.is_empty() {
            continue;
        }
        match out.iter_mut().find(|f| f.name == node.value) {
            Some(f) => {
                f.nodes.push(id);
                if f.ty.is_none() {
                    f.ty = node.declared_type.clone();
                }
            }
            None => out.push(FreeName {
                name: node.value.clone(),
                ty: node.declared_type.clone(),
                nodes: vec![id],
            }),
        }
    }
    out
}

/// The `n`-th assignment choosing one candidate per slot with no candidate
/// used twice, in lexicographic order of candidate indices.
fn nth_injective(candidates: &[Vec<String>], n: usize) -> Option<Vec<usize>> {
    if candidates.iter().any(|c| c.is_empty()) {
        return None;
    }
    let mut indices = vec![0usize; candidates.len()];
    let mut found = 0usize;
    for _ in 0..MAX_BINDING_STEPS {
        let chosen: HashSet<&str> = indices
            .iter()
            .zip(candidates)
            .map(|(i, c)| c[*i].as_str())
            .collect();
        if chosen.len() == indices.len() {
            if found == n {
                return Some(indices);
            }
            found += 1;
        }
        // Advance the odometer, last position fastest.
        let mut pos = indices.len();
        loop {
            if pos == 0 {
                return None;
            }
            pos -= 1;
            indices[pos] += 1;
            if indices[pos] < candidates[pos].len() {
                break;
            }
            indices[pos] = 0;
        }
    }
    None
}

// ============================================================================
// Concretizer
// ============================================================================

/// Per-file concretization state.
#[derive(Debug, Clone)]
pub struct Concretizer {
    strategy: ConcretizationStrategy,
    materials: Materials,
}

impl Concretizer {
    /// Collect global materials for a file.
    pub fn new(strategy: ConcretizationStrategy, tree: &Tree, imports: Vec<String>) -> Self {
        Concretizer {
            strategy,
            materials: Materials::collect(tree, imports),
        }
    }

    pub fn strategy(&self) -> ConcretizationStrategy {
        self.strategy
    }

    pub fn materials(&self) -> &Materials {
        &self.materials
    }

    pub fn compatible(&self, expected: Option<&str>, actual: Option<&str>) -> bool {
        self.strategy
            .compatible(expected, actual, &self.materials.supertypes)
    }

    /// Whether an update rebinds the payload root itself.
    fn rebinds_root(change: &Change) -> bool {
        let root = change.payload.node(change.root());
        change.kind == ChangeKind::Update
            && root.normalized
            && root.is_name()
            && root.role.is_some_and(|r| r.is_value())
    }

    fn candidates(
        &self,
        tree: &Tree,
        at: NodeId,
        name: &str,
        expected: Option<&str>,
        exclude: Option<&str>,
    ) -> Vec<String> {
        let mut out: Vec<String> = self
            .materials
            .visible_at(tree, at)
            .into_iter()
            .filter(|m| Some(m.name.as_str()) != exclude)
            .filter(|m| self.compatible(expected, m.ty.as_deref()))
            .map(|m| m.name.clone())
            .collect();
        if let Some(i) = out.iter().position(|n| n == name) {
            let identity = out.remove(i);
            out.insert(0, identity);
        }
        out
    }

    /// Cheap admissibility check before full instantiation.
    pub fn inst_check(&self, tree: &Tree, change: &Change, loc: &TargetLocation) -> bool {
        if !tree.contains(loc.node) {
            return false;
        }
        let payload = change.payload.node(change.root());
        let target = tree.node(loc.node);
        if matches!(change.kind, ChangeKind::Update | ChangeKind::Replace) {
            if payload.is_name() && target.is_name() {
                let roles_ok = match (payload.role, target.role) {
                    (Some(p), Some(t)) => p == t || (p.is_value() && t.is_value()),
                    _ => true,
                };
                if !roles_ok {
                    return false;
                }
            }
            if !payload.statement
                && !target.statement
                && !self.compatible(target.declared_type.as_deref(), payload.declared_type.as_deref())
            {
                return false;
            }
        }
        if Self::rebinds_root(change) {
            let current = Some(target.value.as_str());
            return !self
                .candidates(tree, loc.node, &payload.value, target.declared_type.as_deref(), current)
                .is_empty();
        }
        free_names(&change.payload).iter().all(|f| {
            !self
                .candidates(tree, loc.node, &f.name, f.ty.as_deref(), None)
                .is_empty()
        })
    }

    /// Bind the template's free names for attempt `attempt`.
    pub fn instantiate(
        &self,
        tree: &Tree,
        change: &Change,
        loc: &TargetLocation,
        attempt: usize,
    ) -> Result<Instance, NotInstantiable> {
        if !tree.contains(loc.node) {
            return Err(NotInstantiable);
        }
        let payload = &change.payload;
        let root = payload.root();
        let root_data = payload.node(root);
        let target = tree.node(loc.node);

        let mut names = free_names(payload);
        let mut candidates: Vec<Vec<String>> = Vec::new();
        if Self::rebinds_root(change) {
            names.retain(|f| !f.nodes.contains(&root));
            candidates.push(self.candidates(
                tree,
                loc.node,
                &root_data.value,
                target.declared_type.as_deref(),
                Some(target.value.as_str()),
            ));
            names.insert(
                0,
                FreeName {
                    name: root_data.value.clone(),
                    ty: target.declared_type.clone(),
                    nodes: vec![root],
                },
            );
            for f in &names[1..] {
                candidates.push(self.candidates(tree, loc.node, &f.name, f.ty.as_deref(), None));
            }
        } else {
            for f in &names {
                candidates.push(self.candidates(tree, loc.node, &f.name, f.ty.as_deref(), None));
            }
        }

        let choice = nth_injective(&candidates, attempt).ok_or(NotInstantiable)?;
        let bindings: Vec<(String, String)> = names
            .iter()
            .zip(&choice)
            .zip(&candidates)
            .map(|((f, i), c)| (f.name.clone(), c[*i].clone()))
            .collect();

        let mut edits: Vec<TextEdit> = Vec::new();
        for (f, (_, bound)) in names.iter().zip(&bindings) {
            if &f.name == bound {
                continue;
            }
            for id in &f.nodes {
                for span in &payload.node(*id).value_spans {
                    edits.push(TextEdit::new(*span, bound.clone()));
                }
            }
        }
        let text = splice(payload.source(), &edits);
        let root_span = root_data.span;
        let delta: isize = edits
            .iter()
            .filter(|e| root_span.contains(&e.span))
            .map(|e| e.text.len() as isize - e.span.len() as isize)
            .sum();
        let expr_end = Span::point(root_span.end).shifted(delta).start;
        let expr_text = text
            .get(root_span.start..expr_end)
            .unwrap_or(text.as_str())
            .to_string();
        let value = bindings
            .iter()
            .find(|(from, _)| names.first().is_some_and(|f| f.nodes.contains(&root) && &f.name == from))
            .map(|(_, to)| to.clone())
            .unwrap_or_else(|| root_data.value.clone());

        let identifiers: HashSet<&str> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
            .collect();
        let imports = change
            .requirements
            .iter()
            .filter(|q| {
                let simple = q.rsplit('.').next().unwrap_or(q);
                identifiers.contains(simple) && !self.materials.imports.contains(q)
            })
            .cloned()
            .collect();

        let method = if bindings.iter().all(|(a, b)| a == b) {
            format!("{}#{}:identity", self.strategy.name(), attempt)
        } else {
            let pairs: Vec<String> = bindings
                .iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| format!("{}->{}", a, b))
                .collect();
            format!("{}#{}:{}", self.strategy.name(), attempt, pairs.join(","))
        };

        Ok(Instance {
            text,
            expr_text,
            value,
            imports,
            method,
            bindings,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Anchor;
    use crate::location::InsertionKind;
    use crate::testing::Sketch;

    mod type_rules {
        use super::*;

        fn tc(expected: &str, actual: &str) -> bool {
            ConcretizationStrategy::TypeCompatible.compatible(
                Some(expected),
                Some(actual),
                &BTreeMap::new(),
            )
        }

        #[test]
        fn normalize_drops_generics_and_packages() {
            assert_eq!(normalize_type("java.util.List<String>"), "List");
            assert_eq!(normalize_type("a.b.C[][]"), "C[][]");
            assert_eq!(normalize_type("Map<K, List<V>>"), "Map");
        }

        #[test]
        fn widening_and_boxing() {
            assert!(tc("long", "int"));
            assert!(!tc("int", "long"));
            assert!(tc("Integer", "int"));
            assert!(tc("int", "Integer"));
            assert!(tc("long", "Integer"));
            assert!(!tc("boolean", "int"));
        }

        #[test]
        fn null_and_object() {
            assert!(tc("String", "null"));
            assert!(!tc("int", "null"));
            assert!(tc("Object", "String"));
        }

        #[test]
        fn same_file_subtypes() {
            let mut supers = BTreeMap::new();
            supers.insert("Dog".to_string(), vec!["Animal".to_string()]);
            supers.insert("Animal".to_string(), vec!["Named".to_string()]);
            let s = ConcretizationStrategy::TypeCompatible;
            assert!(s.compatible(Some("Named"), Some("Dog"), &supers));
            assert!(!s.compatible(Some("Dog"), Some("Animal"), &supers));
        }

        #[test]
        fn exact_rejects_widening() {
            let s = ConcretizationStrategy::ExactType;
            assert!(!s.compatible(Some("long"), Some("int"), &BTreeMap::new()));
            assert!(s.compatible(Some("List<A>"), Some("java.util.List<B>"), &BTreeMap::new()));
            assert!(s.compatible(None, Some("int"), &BTreeMap::new()));
        }

        #[test]
        fn strategy_names() {
            assert_eq!(
                ConcretizationStrategy::from_name("tc"),
                Some(ConcretizationStrategy::TypeCompatible)
            );
            assert_eq!(ConcretizationStrategy::ExactType.name(), "exact");
            assert_eq!(ConcretizationStrategy::from_name("random"), None);
        }
    }

    mod binding {
        use super::*;

        #[test]
        fn injective_enumeration() {
            let cands = vec![
                vec!["x".to_string(), "y".to_string()],
                vec!["x".to_string(), "y".to_string()],
            ];
            assert_eq!(nth_injective(&cands, 0), Some(vec![0, 1]));
            assert_eq!(nth_injective(&cands, 1), Some(vec![1, 0]));
            assert_eq!(nth_injective(&cands, 2), None);
            assert_eq!(nth_injective(&[vec![]], 0), None);
            assert_eq!(nth_injective(&[], 0), Some(vec![]));
        }
    }

    /// `void m(int p) { int a = 0; long c = 1; if (a == b) go(); }` with
    /// field `int b` and `String s`.
    struct Target {
        tree: Tree,
        cond: NodeId,
        left: NodeId,
    }

    fn target() -> Target {
        let src = "class K { int b; String s; void m(int p) { int a = 0; long c = 1; if (a == b) go(); } }";
        let mut s = Sketch::new(src);
        let root = s.root();
        let class = s.add(root, "TypeDeclaration", Category::Declaration, src, "types[]");
        let field_b = s.add(class, "FieldDeclaration", Category::Declaration, "int b;", "bodyDeclarations[]");
        let b = s.name(field_b, "b", Role::Field, Some("int"), "fragments[]");
        s.set(b).declaration = true;
        let field_s = s.add(class, "FieldDeclaration", Category::Declaration, "String s;", "bodyDeclarations[]");
        let fs = s.name(field_s, "s", Role::Field, Some("String"), "fragments[]");
        s.set(fs).declaration = true;
        let method = s.add(
            class,
            "MethodDeclaration",
            Category::Declaration,
            "void m(int p) { int a = 0; long c = 1; if (a == b) go(); }",
            "bodyDeclarations[]",
        );
        s.set(method).scope = true;
        let p = s.name(method, "p", Role::Variable, Some("int"), "parameters[]");
        s.set(p).declaration = true;
        let body = s.stmt(method, "Block", "{ int a = 0; long c = 1; if (a == b) go(); }", "body");
        s.set(body).scope = true;
        let decl_a = s.stmt(body, "VariableDeclarationStatement", "int a = 0;", "statements[]");
        let a = s.name(decl_a, "a", Role::Variable, Some("int"), "fragments[]");
        s.set(a).declaration = true;
        let decl_c = s.stmt(body, "VariableDeclarationStatement", "long c = 1;", "statements[]");
        let c = s.name(decl_c, "c", Role::Variable, Some("long"), "fragments[]");
        s.set(c).declaration = true;
        let iff = s.stmt(body, "IfStatement", "if (a == b) go();", "statements[]");
        let cond = s.expr(iff, "InfixExpression", "a == b", "expression");
        s.set(cond).declared_type = Some("boolean".to_string());
        let left = s.name(cond, "a", Role::Variable, Some("int"), "leftOperand");
        s.name(cond, "b", Role::Field, Some("int"), "rightOperand");
        s.operator(cond);
        let call = s.expr_stmt(iff, "MethodInvocation", "go();", "thenStatement");
        s.name(call, "go", Role::Method, None, "name");
        Target {
            tree: s.finish(),
            cond,
            left,
        }
    }

    fn template(code: &str, names: &[(&str, Role, &str)], kind: ChangeKind) -> Change {
        let mut s = Sketch::new(code);
        let root = s.root();
        let infix = s.expr(root, "InfixExpression", code, "expression");
        let slots = ["leftOperand", "rightOperand"];
        for (i, (name, role, ty)) in names.iter().enumerate() {
            s.name(infix, name, *role, Some(ty), slots[i.min(1)]);
        }
        s.operator(infix);
        s.set(infix).declared_type = Some("boolean".to_string());
        let tree = s.finish();
        Change::new("t", kind, tree.copy_subtree(infix), Anchor::of(&tree, infix), BTreeSet::new())
    }

    fn loc_at(t: &Target, node: NodeId) -> TargetLocation {
        TargetLocation::at(&t.tree, "K", node, InsertionKind::NotApplicable)
    }

    #[test]
    fn materials_scopes_and_order() {
        let t = target();
        let c = Concretizer::new(ConcretizationStrategy::TypeCompatible, &t.tree, vec![]);
        let visible: Vec<&str> = c
            .materials()
            .visible_at(&t.tree, t.cond)
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(visible, vec!["c", "a", "p", "b", "s"]);
    }

    #[test]
    fn identity_binding_first() {
        let t = target();
        let c = Concretizer::new(ConcretizationStrategy::TypeCompatible, &t.tree, vec![]);
        let change = template(
            "a != b",
            &[("a", Role::Variable, "int"), ("b", Role::Field, "int")],
            ChangeKind::Replace,
        );
        let inst = c.instantiate(&t.tree, &change, &loc_at(&t, t.cond), 0).unwrap();
        assert_eq!(inst.text, "a != b");
        assert!(inst.method.ends_with("identity"));
    }

    #[test]
    fn attempts_walk_other_bindings_and_are_pure() {
        let t = target();
        let c = Concretizer::new(ConcretizationStrategy::TypeCompatible, &t.tree, vec![]);
        let change = template(
            "x < y",
            &[("x", Role::Variable, "int"), ("y", Role::Variable, "int")],
            ChangeKind::Replace,
        );
        let loc = loc_at(&t, t.cond);
        let first = c.instantiate(&t.tree, &change, &loc, 0).unwrap();
        let again = c.instantiate(&t.tree, &change, &loc, 0).unwrap();
        assert_eq!(first, again);
        // int-compatible visible values, nearest first: a, p, b (c is long).
        assert_eq!(first.text, "a < p");
        let second = c.instantiate(&t.tree, &change, &loc, 1).unwrap();
        assert_eq!(second.text, "a < b");
        assert!(c.instantiate(&t.tree, &change, &loc, 6).is_err());
    }

    #[test]
    fn exact_strategy_narrows_candidates() {
        let t = target();
        let c = Concretizer::new(ConcretizationStrategy::ExactType, &t.tree, vec![]);
        let change = template("x < 0", &[("x", Role::Variable, "long")], ChangeKind::Replace);
        let inst = c.instantiate(&t.tree, &change, &loc_at(&t, t.cond), 0).unwrap();
        assert_eq!(inst.text, "c < 0");
        assert!(c.instantiate(&t.tree, &change, &loc_at(&t, t.cond), 1).is_err());
    }

    #[test]
    fn no_compatible_binding() {
        let t = target();
        let c = Concretizer::new(ConcretizationStrategy::TypeCompatible, &t.tree, vec![]);
        let change = template("q.isEmpty()", &[("q", Role::Variable, "java.util.Map")], ChangeKind::Replace);
        let loc = loc_at(&t, t.cond);
        assert!(!c.inst_check(&t.tree, &change, &loc));
        assert_eq!(c.instantiate(&t.tree, &change, &loc, 0), Err(NotInstantiable));
    }

    #[test]
    fn normalized_update_rebinds_root() {
        let t = target();
        let c = Concretizer::new(ConcretizationStrategy::TypeCompatible, &t.tree, vec![]);
        let mut s = Sketch::new("z");
        let root = s.root();
        let name = s.name(root, "z", Role::Variable, Some("int"), "leftOperand");
        s.set(name).normalized = true;
        let tree = s.finish();
        let mut payload = tree.copy_subtree(name);
        let proot = payload.root();
        payload.node_mut(proot).normalized = true;
        let anchor = Anchor::of(&t.tree, t.left);
        let change = Change::new("u", ChangeKind::Update, payload, anchor, BTreeSet::new());
        let loc = loc_at(&t, t.left);
        assert!(c.inst_check(&t.tree, &change, &loc));
        let inst = c.instantiate(&t.tree, &change, &loc, 0).unwrap();
        // `a` itself is excluded; nearest other int is the parameter.
        assert_eq!(inst.value, "p");
        assert_eq!(inst.text, "p");
    }
}
