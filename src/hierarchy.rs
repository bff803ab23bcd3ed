//! Class hierarchy oracle used by the merged-type computation

use std::collections::HashMap;

use crate::defs::OBJECT;

/// Upper bound on superclass-chain walks, guarding against cyclic
/// registrations handed in by the caller.
const MAX_HIERARCHY_STEPS: usize = 10_000;

/// Supplies declared supertype edges for internal class names.
///
/// The emitter does not load classes; whoever drives it is expected to know
/// the hierarchy of the types it mentions and expose it through this trait.
/// `None` means the type is unknown (or is the root), in which case the merge
/// walk treats its supertype as `java/lang/Object`.
pub trait ClassHierarchy {
    fn super_class_of(&self, internal_name: &str) -> Option<String>;
}

/// Default oracle: an explicit name-to-supertype registry.
#[derive(Debug, Default)]
pub struct HierarchyRegistry {
    super_classes: HashMap<String, String>,
}

impl HierarchyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a declared supertype edge.
    pub fn add_super_class(&mut self, internal_name: &str, super_name: &str) {
        self.super_classes.insert(internal_name.to_owned(), super_name.to_owned());
    }
}

impl ClassHierarchy for HierarchyRegistry {
    fn super_class_of(&self, internal_name: &str) -> Option<String> {
        self.super_classes.get(internal_name).cloned()
    }
}

/// Computes the internal name of the nearest common ancestor of two types by
/// walking both superclass chains upward in lockstep. `java/lang/Object` is
/// absorbing, and equal inputs resolve to themselves before any walk.
pub(crate) fn common_super_class(
    hierarchy: &dyn ClassHierarchy,
    type1: &str,
    type2: &str,
) -> String {
    let mut class1 = type1.to_owned();
    let mut class2 = type2.to_owned();

    for _ in 0..MAX_HIERARCHY_STEPS {
        if class1 == class2 {
            return class1;
        }
        if class1 == OBJECT || class2 == OBJECT {
            return OBJECT.to_owned();
        }
        if let Some(ancestor) = which_is_super(hierarchy, &class1, &class2) {
            return ancestor;
        }

        class1 = step_up(hierarchy, &class1);
        class2 = step_up(hierarchy, &class2);
    }

    OBJECT.to_owned()
}

/// Returns whichever of the two classes is a transitive superclass of the
/// other, if either is.
fn which_is_super(hierarchy: &dyn ClassHierarchy, class1: &str, class2: &str) -> Option<String> {
    if is_ancestor(hierarchy, class1, class2) {
        return Some(class1.to_owned());
    }
    if is_ancestor(hierarchy, class2, class1) {
        return Some(class2.to_owned());
    }
    None
}

fn is_ancestor(hierarchy: &dyn ClassHierarchy, ancestor: &str, descendant: &str) -> bool {
    let mut current = descendant.to_owned();
    for _ in 0..MAX_HIERARCHY_STEPS {
        if current == OBJECT {
            return false;
        }
        current = step_up(hierarchy, &current);
        if current == ancestor {
            return true;
        }
    }
    false
}

fn step_up(hierarchy: &dyn ClassHierarchy, internal_name: &str) -> String {
    hierarchy.super_class_of(internal_name).unwrap_or_else(|| OBJECT.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HierarchyRegistry {
        let mut h = HierarchyRegistry::new();
        h.add_super_class("java/util/ArrayList", "java/util/AbstractList");
        h.add_super_class("java/util/AbstractList", "java/util/AbstractCollection");
        h.add_super_class("java/util/AbstractCollection", OBJECT);
        h.add_super_class("java/util/LinkedList", "java/util/AbstractSequentialList");
        h.add_super_class("java/util/AbstractSequentialList", "java/util/AbstractList");
        h
    }

    #[test]
    fn test_object_is_absorbing() {
        let h = registry();
        assert_eq!(common_super_class(&h, OBJECT, "java/util/ArrayList"), OBJECT);
        assert_eq!(common_super_class(&h, "java/util/ArrayList", OBJECT), OBJECT);
        assert_eq!(common_super_class(&h, OBJECT, OBJECT), OBJECT);
    }

    #[test]
    fn test_equal_inputs_return_immediately() {
        let h = HierarchyRegistry::new();
        // No edges registered for this name, yet no walk is needed.
        assert_eq!(common_super_class(&h, "com/x/Unknown", "com/x/Unknown"), "com/x/Unknown");
    }

    #[test]
    fn test_direct_ancestor_wins() {
        let h = registry();
        assert_eq!(
            common_super_class(&h, "java/util/AbstractList", "java/util/ArrayList"),
            "java/util/AbstractList"
        );
    }

    #[test]
    fn test_lockstep_walk_meets_at_shared_ancestor() {
        let h = registry();
        assert_eq!(
            common_super_class(&h, "java/util/ArrayList", "java/util/LinkedList"),
            "java/util/AbstractList"
        );
    }

    #[test]
    fn test_unknown_types_fall_back_to_object() {
        let h = HierarchyRegistry::new();
        assert_eq!(common_super_class(&h, "com/x/A", "com/x/B"), OBJECT);
    }
}
