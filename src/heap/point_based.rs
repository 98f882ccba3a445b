//! Allocation-site based heap.
//!
//! Every allocation site is one abstract memory location. A location starts *strong* (it stands for a
//! single concrete object, so writes overwrite its value) and becomes *weak* as soon as the site is
//! reached again while already allocated, for instance inside a loop. The transition is reported to
//! the value domain as a [`HeapReplacement`] from the strong identifier to the weak one.
//!
//! Pointer variables are tracked in an [`Environment`] of [`LocationSet`]s. A variable that is not in
//! the environment may point anywhere: dereferencing it reaches every known site plus an unknown weak
//! location.
//!
//! # Lattice Structure
//!
//! *   **Bottom**: unreachable heap.
//! *   **Regular**: points-to sets ordered pointwise, allocation sites ordered by
//!     `absent ⊑ strong ⊑ weak`.
//! *   **Top**: nothing is known; every access reaches the unknown weak location.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::{rewrite_expression, HeapDomain, HeapReplacement, HeapRewriter, HeapSemantics};
use crate::environment::Environment;
use crate::error::SemanticError;
use crate::lattice::Lattice;
use crate::symbolic::{Constant, ExprKind, ExpressionSet, Identifier, IdentifierKind, ScopeToken, SymbolicExpression};
use crate::types::{Type, TypeSet};

/// Name of the location standing for memory the analysis knows nothing about.
pub const UNKNOWN_LOCATION: &str = "?";

/// Locations a pointer may point to. The empty set is the null pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationSet {
    Bottom,
    Set(BTreeSet<Identifier>),
    Top,
}

impl LocationSet {
    pub fn single(location: Identifier) -> Self {
        LocationSet::Set(BTreeSet::from([location]))
    }

    pub fn null() -> Self {
        LocationSet::Set(BTreeSet::new())
    }

    fn replace(&self, from: &Identifier, to: &Identifier) -> Self {
        match self {
            LocationSet::Set(s) if s.contains(from) => {
                LocationSet::Set(s.iter().map(|l| if l == from { to.clone() } else { l.clone() }).collect())
            }
            other => other.clone(),
        }
    }
}

impl Lattice for LocationSet {
    fn bottom() -> Self {
        LocationSet::Bottom
    }

    fn top() -> Self {
        LocationSet::Top
    }

    fn is_bottom(&self) -> bool {
        matches!(self, LocationSet::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, LocationSet::Top)
    }

    fn leq(&self, other: &Self) -> bool {
        match (self, other) {
            (LocationSet::Bottom, _) | (_, LocationSet::Top) => true,
            (LocationSet::Set(a), LocationSet::Set(b)) => a.is_subset(b),
            _ => false,
        }
    }

    fn lub(&self, other: &Self) -> Self {
        match (self, other) {
            (LocationSet::Bottom, x) | (x, LocationSet::Bottom) => x.clone(),
            (LocationSet::Top, _) | (_, LocationSet::Top) => LocationSet::Top,
            (LocationSet::Set(a), LocationSet::Set(b)) => LocationSet::Set(a.union(b).cloned().collect()),
        }
    }

    fn widening(&self, other: &Self) -> Self {
        // Finitely many allocation sites.
        self.lub(other)
    }

    fn glb(&self, other: &Self) -> Self {
        match (self, other) {
            (LocationSet::Bottom, _) | (_, LocationSet::Bottom) => LocationSet::Bottom,
            (LocationSet::Top, x) | (x, LocationSet::Top) => x.clone(),
            (LocationSet::Set(a), LocationSet::Set(b)) => LocationSet::Set(a.intersection(b).cloned().collect()),
        }
    }
}

impl fmt::Display for LocationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationSet::Bottom => write!(f, "⊥"),
            LocationSet::Top => write!(f, "⊤"),
            LocationSet::Set(s) => {
                let names: Vec<String> = s.iter().map(|l| l.to_string()).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Bottom,
    Regular,
    Top,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointBasedHeap {
    shape: Shape,
    pointers: Environment<LocationSet>,
    /// Allocated sites, mapped to whether their location is weak.
    sites: BTreeMap<String, bool>,
}

impl PointBasedHeap {
    /// Heap in which nothing was allocated yet.
    pub fn new() -> Self {
        PointBasedHeap {
            shape: Shape::Regular,
            pointers: Environment::new(),
            sites: BTreeMap::new(),
        }
    }

    pub fn unknown_location() -> Identifier {
        Identifier::heap_location(UNKNOWN_LOCATION, true)
    }

    pub fn points_to(&self, id: &Identifier) -> LocationSet {
        match self.shape {
            Shape::Bottom => LocationSet::Bottom,
            Shape::Top => LocationSet::Top,
            Shape::Regular => self.pointers.get(id),
        }
    }

    /// Whether the location of an allocation site is weak, `None` if the site was never reached.
    pub fn is_weak_site(&self, site: &str) -> Option<bool> {
        self.sites.get(site).copied()
    }

    fn location_of(&self, site: &str) -> Identifier {
        if self.shape == Shape::Top {
            return Self::unknown_location();
        }
        let weak = self.sites.get(site).copied().unwrap_or(false);
        Identifier::heap_location(site, weak)
    }

    fn all_locations(&self) -> Vec<Identifier> {
        let mut locations: Vec<Identifier> = self.sites.keys().map(|site| self.location_of(site)).collect();
        locations.push(Self::unknown_location());
        locations
    }

    /// Register an allocation at `site`, returning the location and the replacement it induces.
    fn allocate(&mut self, site: &str) -> (Identifier, Option<HeapReplacement>) {
        if self.shape == Shape::Top {
            return (Self::unknown_location(), None);
        }
        match self.sites.get(site).copied() {
            None => {
                self.sites.insert(site.to_string(), false);
                (Identifier::heap_location(site, false), None)
            }
            Some(true) => (Identifier::heap_location(site, true), None),
            Some(false) => {
                let strong = Identifier::heap_location(site, false);
                let weak = Identifier::heap_location(site, true);
                log::trace!("Allocation site '{}' becomes weak", site);
                self.sites.insert(site.to_string(), true);
                let mut pointers = self.pointers.clone();
                for (var, locations) in self.pointers.iter() {
                    let replaced = locations.replace(&strong, &weak);
                    if &replaced != locations {
                        pointers = pointers.set(var.clone(), replaced);
                    }
                }
                self.pointers = pointers;
                let mut replacement = HeapReplacement::new();
                replacement.add_source(strong);
                replacement.add_target(weak.clone());
                (weak, Some(replacement))
            }
        }
    }

    fn with_pointers(&self, pointers: Environment<LocationSet>) -> Self {
        if pointers.is_bottom() {
            return Self::bottom();
        }
        PointBasedHeap {
            shape: self.shape,
            pointers,
            sites: self.sites.clone(),
        }
    }

    fn sites_leq(&self, other: &Self) -> bool {
        self.sites
            .iter()
            .all(|(site, weak)| matches!(other.sites.get(site), Some(w) if *w || !*weak))
    }

    fn combine_sites(&self, other: &Self, keep_all: bool) -> BTreeMap<String, bool> {
        let mut sites = BTreeMap::new();
        for (site, weak) in &self.sites {
            match other.sites.get(site) {
                Some(w) if keep_all => {
                    sites.insert(site.clone(), *weak || *w);
                }
                Some(w) => {
                    sites.insert(site.clone(), *weak && *w);
                }
                None if keep_all => {
                    sites.insert(site.clone(), *weak);
                }
                None => {}
            }
        }
        if keep_all {
            for (site, weak) in &other.sites {
                sites.entry(site.clone()).or_insert(*weak);
            }
        }
        sites
    }
}

impl Default for PointBasedHeap {
    fn default() -> Self {
        Self::new()
    }
}

struct PointBasedRewriter {
    heap: PointBasedHeap,
    substitution: Vec<HeapReplacement>,
    /// Whether allocations update the heap.
    allocating: bool,
}

impl PointBasedRewriter {
    fn pointer(location: &Identifier) -> SymbolicExpression {
        SymbolicExpression::identifier(Identifier::pointer_to(location), TypeSet::single(Type::Pointer))
    }
}

impl HeapRewriter for PointBasedRewriter {
    fn rewrite_leaf(&mut self, expr: &SymbolicExpression) -> Result<Vec<SymbolicExpression>, SemanticError> {
        match &expr.kind {
            ExprKind::Identifier(id) if id.is_variable() => match self.heap.points_to(id) {
                LocationSet::Set(locations) if !locations.is_empty() => {
                    Ok(locations.iter().map(Self::pointer).collect())
                }
                _ => Ok(vec![expr.clone()]),
            },
            ExprKind::Identifier(_) => Ok(vec![expr.clone()]),
            ExprKind::HeapAllocation { site } => {
                let location = if self.allocating {
                    let (location, replacement) = self.heap.allocate(site);
                    self.substitution.extend(replacement);
                    location
                } else {
                    self.heap.location_of(site)
                };
                Ok(vec![SymbolicExpression::identifier(location, expr.types.clone())])
            }
            ExprKind::HeapReference(inner) => {
                let mut result = Vec::new();
                for loc in rewrite_expression(self, inner)? {
                    match loc.as_identifier() {
                        Some(id) if id.is_heap_location() => result.push(Self::pointer(id)),
                        _ => return Err(SemanticError::UnsupportedHeapExpression(expr.to_string())),
                    }
                }
                Ok(result)
            }
            ExprKind::HeapDereference(inner) => {
                let mut locations = BTreeSet::new();
                for target in rewrite_expression(self, inner)? {
                    match &target.kind {
                        ExprKind::Constant(_) => {}
                        ExprKind::Identifier(id) => match id.kind {
                            IdentifierKind::MemoryPointer if self.heap.shape == Shape::Top => {
                                locations.insert(PointBasedHeap::unknown_location());
                            }
                            IdentifierKind::MemoryPointer => {
                                let weak = self.heap.sites.get(&id.name).copied().unwrap_or(true);
                                locations.insert(Identifier::heap_location(id.name.clone(), weak));
                            }
                            IdentifierKind::Variable => match self.heap.points_to(id) {
                                LocationSet::Set(s) => locations.extend(s),
                                LocationSet::Top => locations.extend(self.heap.all_locations()),
                                LocationSet::Bottom => {}
                            },
                            IdentifierKind::HeapLocation { .. } => {
                                // Pointers stored in memory are not tracked.
                                locations.extend(self.heap.all_locations());
                            }
                        },
                        _ => return Err(SemanticError::UnsupportedHeapExpression(expr.to_string())),
                    }
                }
                Ok(locations
                    .into_iter()
                    .map(|l| SymbolicExpression::identifier(l, expr.types.clone()))
                    .collect())
            }
            _ => Ok(vec![expr.clone()]),
        }
    }
}

impl Lattice for PointBasedHeap {
    fn bottom() -> Self {
        PointBasedHeap {
            shape: Shape::Bottom,
            pointers: Environment::bottom(),
            sites: BTreeMap::new(),
        }
    }

    fn top() -> Self {
        PointBasedHeap {
            shape: Shape::Top,
            pointers: Environment::top(),
            sites: BTreeMap::new(),
        }
    }

    fn is_bottom(&self) -> bool {
        self.shape == Shape::Bottom
    }

    fn is_top(&self) -> bool {
        self.shape == Shape::Top
    }

    fn leq(&self, other: &Self) -> bool {
        match (self.shape, other.shape) {
            (Shape::Bottom, _) | (_, Shape::Top) => true,
            (_, Shape::Bottom) | (Shape::Top, _) => false,
            (Shape::Regular, Shape::Regular) => self.pointers.leq(&other.pointers) && self.sites_leq(other),
        }
    }

    fn lub(&self, other: &Self) -> Self {
        match (self.shape, other.shape) {
            (Shape::Bottom, _) => other.clone(),
            (_, Shape::Bottom) => self.clone(),
            (Shape::Top, _) | (_, Shape::Top) => Self::top(),
            (Shape::Regular, Shape::Regular) => PointBasedHeap {
                shape: Shape::Regular,
                pointers: self.pointers.lub(&other.pointers),
                sites: self.combine_sites(other, true),
            },
        }
    }

    fn widening(&self, other: &Self) -> Self {
        self.lub(other)
    }

    fn glb(&self, other: &Self) -> Self {
        match (self.shape, other.shape) {
            (Shape::Bottom, _) | (_, Shape::Bottom) => Self::bottom(),
            (Shape::Top, _) => other.clone(),
            (_, Shape::Top) => self.clone(),
            (Shape::Regular, Shape::Regular) => {
                let pointers = self.pointers.glb(&other.pointers);
                if pointers.is_bottom() {
                    return Self::bottom();
                }
                PointBasedHeap {
                    shape: Shape::Regular,
                    pointers,
                    sites: self.combine_sites(other, false),
                }
            }
        }
    }
}

impl HeapDomain for PointBasedHeap {
    fn rewrite(&self, expr: &SymbolicExpression) -> Result<ExpressionSet, SemanticError> {
        if self.is_bottom() {
            return Ok(ExpressionSet::new());
        }
        let mut rewriter = PointBasedRewriter {
            heap: self.clone(),
            substitution: Vec::new(),
            allocating: false,
        };
        Ok(rewrite_expression(&mut rewriter, expr)?.into_iter().collect())
    }

    fn small_step_semantics(&self, expr: &SymbolicExpression) -> Result<HeapSemantics<Self>, SemanticError> {
        if self.is_bottom() {
            return Ok(HeapSemantics {
                state: self.clone(),
                rewritten: ExpressionSet::new(),
                substitution: Vec::new(),
            });
        }
        let mut rewriter = PointBasedRewriter {
            heap: self.clone(),
            substitution: Vec::new(),
            allocating: true,
        };
        let rewritten: ExpressionSet = rewrite_expression(&mut rewriter, expr)?.into_iter().collect();
        let state = if rewritten.is_empty() { Self::bottom() } else { rewriter.heap };
        Ok(HeapSemantics {
            state,
            rewritten,
            substitution: rewriter.substitution,
        })
    }

    fn assign(&self, id: &Identifier, expr: &SymbolicExpression) -> Result<Self, SemanticError> {
        if self.shape != Shape::Regular || !id.is_variable() {
            return Ok(self.clone());
        }
        let locations = match &expr.kind {
            ExprKind::Identifier(target) => match target.pointed_location(false) {
                Some(_) => {
                    let weak = self.sites.get(&target.name).copied().unwrap_or(true);
                    LocationSet::single(Identifier::heap_location(target.name.clone(), weak))
                }
                None => LocationSet::Top,
            },
            ExprKind::Constant(Constant::Null) => LocationSet::null(),
            _ => LocationSet::Top,
        };
        Ok(self.with_pointers(self.pointers.set(id.clone(), locations)))
    }

    fn forget_identifier(&self, id: &Identifier) -> Self {
        self.with_pointers(self.pointers.forget(id))
    }

    fn forget_identifiers_if(&self, pred: &dyn Fn(&Identifier) -> bool) -> Self {
        self.with_pointers(self.pointers.forget_if(pred))
    }

    fn push_scope(&self, token: &ScopeToken) -> Self {
        self.with_pointers(self.pointers.push_scope(token))
    }

    fn pop_scope(&self, token: &ScopeToken) -> Self {
        self.with_pointers(self.pointers.pop_scope(token))
    }

    fn restore_frame(&self, caller: &Self) -> Self {
        match (self.shape, caller.shape) {
            (Shape::Bottom, _) | (_, Shape::Bottom) => Self::bottom(),
            (Shape::Top, _) => Self::top(),
            (Shape::Regular, Shape::Top) => self.clone(),
            (Shape::Regular, Shape::Regular) => self.with_pointers(self.pointers.restore_frame(&caller.pointers)),
        }
    }
}

impl fmt::Display for PointBasedHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            Shape::Bottom => write!(f, "⊥"),
            Shape::Top => write!(f, "⊤"),
            Shape::Regular => {
                let sites: Vec<String> = self
                    .sites
                    .iter()
                    .map(|(site, weak)| if *weak { format!("{}(w)", site) } else { site.clone() })
                    .collect();
                write!(f, "{} sites[{}]", self.pointers, sites.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::lattice::laws::check_lattice_laws;

    fn alloc(site: &str) -> SymbolicExpression {
        let alloc = SymbolicExpression::new(ExprKind::HeapAllocation { site: site.into() }, TypeSet::single(Type::Object));
        SymbolicExpression::new(ExprKind::HeapReference(Box::new(alloc)), TypeSet::single(Type::Pointer))
    }

    fn deref(name: &str) -> SymbolicExpression {
        SymbolicExpression::new(
            ExprKind::HeapDereference(Box::new(SymbolicExpression::variable(name))),
            TypeSet::Top,
        )
    }

    /// `var = new site`, the way the abstract state performs it.
    fn allocate_into(heap: &PointBasedHeap, var: &str, site: &str) -> (PointBasedHeap, Vec<HeapReplacement>) {
        let sem = heap.small_step_semantics(&alloc(site)).unwrap();
        let pointer = sem.state.rewrite(&alloc(site)).unwrap();
        let value = pointer.iter().next().unwrap().clone();
        let heap = sem.state.assign(&Identifier::variable(var), &value).unwrap();
        (heap, sem.substitution)
    }

    #[test]
    fn test_allocation_and_dereference() {
        let (heap, substitution) = allocate_into(&PointBasedHeap::new(), "p", "A");
        assert!(substitution.is_empty());
        assert_eq!(heap.is_weak_site("A"), Some(false));
        assert_eq!(
            heap.points_to(&Identifier::variable("p")),
            LocationSet::single(Identifier::heap_location("A", false))
        );

        let rewritten = heap.rewrite(&deref("p")).unwrap();
        assert_eq!(rewritten.iter().map(|e| e.to_string()).collect::<Vec<_>>(), vec!["heap[s]:A"]);
    }

    #[test]
    fn test_reallocation_weakens_site() {
        let (heap, _) = allocate_into(&PointBasedHeap::new(), "p", "A");
        let (heap, substitution) = allocate_into(&heap, "q", "A");

        assert_eq!(heap.is_weak_site("A"), Some(true));
        assert_eq!(substitution.len(), 1);
        assert_eq!(substitution[0].to_string(), "{heap[s]:A} -> {heap[w]:A}");
        // Earlier pointers follow the site.
        assert_eq!(
            heap.points_to(&Identifier::variable("p")),
            LocationSet::single(Identifier::heap_location("A", true))
        );
    }

    #[test]
    fn test_unknown_pointer_reaches_every_site() {
        let (heap, _) = allocate_into(&PointBasedHeap::new(), "p", "A");
        let rewritten = heap.rewrite(&deref("q")).unwrap();
        let names: Vec<String> = rewritten.iter().map(|e| e.to_string()).collect();
        assert_eq!(names, vec!["heap[w]:?", "heap[s]:A"]);
    }

    #[test]
    fn test_null_dereference_is_bottom() {
        let heap = PointBasedHeap::new()
            .assign(&Identifier::variable("p"), &SymbolicExpression::constant(Constant::Null))
            .unwrap();
        let sem = heap.small_step_semantics(&deref("p")).unwrap();
        assert!(sem.state.is_bottom());
    }

    #[test]
    fn test_point_based_lattice() {
        let (a, _) = allocate_into(&PointBasedHeap::new(), "p", "A");
        let (b, _) = allocate_into(&PointBasedHeap::new(), "q", "B");
        let (c, _) = allocate_into(&a, "r", "A");
        check_lattice_laws(&[
            PointBasedHeap::bottom(),
            PointBasedHeap::new(),
            a.clone(),
            b.clone(),
            c,
            PointBasedHeap::top(),
        ]);

        let joined = a.lub(&b);
        assert_eq!(joined.is_weak_site("A"), Some(false));
        assert_eq!(joined.is_weak_site("B"), Some(false));
        assert!(joined.points_to(&Identifier::variable("p")).is_top());
    }

    #[test]
    fn test_restore_frame_keeps_caller_pointers() {
        let token = ScopeToken::new("main@n0");
        let (caller, _) = allocate_into(&PointBasedHeap::new(), "p", "A");
        let callee_entry = caller.push_scope(&token).forget_identifiers_if(&|id| id.scope.is_some());
        let (callee_exit, _) = allocate_into(&callee_entry, "$ret", "B");

        let restored = callee_exit.restore_frame(&caller);
        assert_eq!(restored.is_weak_site("B"), Some(false));
        assert_eq!(
            restored.points_to(&Identifier::variable("p")),
            LocationSet::single(Identifier::heap_location("A", false))
        );
        assert_eq!(
            restored.points_to(&Identifier::return_slot()),
            LocationSet::single(Identifier::heap_location("B", false))
        );
    }
}
