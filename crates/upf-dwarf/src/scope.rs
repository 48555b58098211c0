//! Scope tree, function table and compile-unit records.

use upf_elf::AddressRange;

use crate::abbrev::AbbrevTable;

/// A variable or parameter visible in a scope, typed by its DIE.
#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    /// Absolute offset of the type DIE in `.debug_info`.
    pub type_die: usize,
}

/// A named type DIE recorded for cast lookups.
#[derive(Clone, Debug)]
pub struct NamedDie {
    pub name: String,
    /// Absolute offset of the DIE in `.debug_info`.
    pub die: usize,
}

/// A lexical scope: PC ranges, the variables it declares, nested scopes.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    pub ranges: Vec<AddressRange>,
    pub vars: Vec<Variable>,
    pub scopes: Vec<Scope>,
}

impl Scope {
    #[must_use]
    pub fn new(ranges: Vec<AddressRange>) -> Self {
        Self {
            ranges,
            vars: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// Whether any of the scope's ranges contains `pc`.
    #[must_use]
    pub fn contains(&self, pc: u64) -> bool {
        self.ranges.iter().any(|range| range.contains(pc))
    }

    /// Collect the scope chain covering `pc`, innermost first.
    pub fn chain_at<'s>(&'s self, pc: u64, out: &mut Vec<&'s Self>) {
        if !self.contains(pc) {
            return;
        }
        // Sibling ranges are disjoint, so at most one child matches.
        for child in &self.scopes {
            if child.contains(pc) {
                child.chain_at(pc, out);
                break;
            }
        }
        out.push(self);
    }
}

/// A subprogram: enough to print its signature and to type calls to it.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    /// Absolute offset of the return type DIE, if the function returns.
    pub return_die: Option<usize>,
    /// Absolute offsets of the parameter type DIEs, in declaration order.
    pub param_dies: Vec<usize>,
    pub variadic: bool,
    pub entry_pc: Option<u64>,
}

/// Per-unit decoding context: sizes and section bases.
#[derive(Clone, Copy, Debug)]
pub struct UnitBases {
    /// Absolute offset of the unit header in `.debug_info`.
    pub base: usize,
    /// 4 for 32-bit DWARF, 8 for 64-bit.
    pub offset_size: u8,
    pub str_offsets_base: Option<u64>,
    pub addr_base: u64,
    pub rnglists_base: Option<u64>,
}

/// One compile unit's worth of debug information.
#[derive(Clone, Debug)]
pub struct CompilationUnit {
    pub bases: UnitBases,
    pub abbrevs: AbbrevTable,
    /// Named top-level types, for resolving cast typenames.
    pub types: Vec<NamedDie>,
    pub functions: Vec<Function>,
    /// Root scope; covers the unit's whole PC range.
    pub scope: Scope,
}

impl CompilationUnit {
    /// The DIE of the named type `name`, if this unit declares one.
    #[must_use]
    pub fn find_named_type(&self, name: &str) -> Option<usize> {
        self.types
            .iter()
            .find(|named| named.name == name)
            .map(|named| named.die)
    }

    /// The type DIE of the variable `name` visible at `pc`, searching the
    /// scope chain inward-to-outward.
    #[must_use]
    pub fn find_variable(&self, pc: u64, name: &str) -> Option<usize> {
        let mut chain = Vec::new();
        self.scope.chain_at(pc, &mut chain);
        chain.iter().find_map(|scope| {
            scope
                .vars
                .iter()
                .find(|var| var.name == name)
                .map(|var| var.type_die)
        })
    }

    /// The function named `name`, if this unit defines one.
    #[must_use]
    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope_tree() -> Scope {
        let mut root = Scope::new(vec![AddressRange::new(0, u64::MAX)]);
        root.vars.push(Variable {
            name: "global".into(),
            type_die: 10,
        });

        let mut function = Scope::new(vec![AddressRange::new(0x1000, 0x2000)]);
        function.vars.push(Variable {
            name: "x".into(),
            type_die: 20,
        });

        let mut block = Scope::new(vec![AddressRange::new(0x1100, 0x1200)]);
        block.vars.push(Variable {
            name: "x".into(),
            type_die: 30,
        });
        function.scopes.push(block);
        root.scopes.push(function);
        root
    }

    fn unit(scope: Scope) -> CompilationUnit {
        CompilationUnit {
            bases: UnitBases {
                base: 0,
                offset_size: 4,
                str_offsets_base: None,
                addr_base: 0,
                rnglists_base: None,
            },
            abbrevs: AbbrevTable::default(),
            types: Vec::new(),
            functions: Vec::new(),
            scope,
        }
    }

    #[test]
    fn test_chain_is_innermost_first() {
        let root = scope_tree();
        let mut chain = Vec::new();
        root.chain_at(0x1150, &mut chain);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].ranges[0], AddressRange::new(0x1100, 0x1200));
        assert_eq!(chain[2].ranges[0], AddressRange::new(0, u64::MAX));
    }

    #[test]
    fn test_inner_variable_shadows_outer() {
        let unit = unit(scope_tree());
        // Inside the block the inner `x` wins.
        assert_eq!(unit.find_variable(0x1150, "x"), Some(30));
        // Outside the block the function's `x` is visible.
        assert_eq!(unit.find_variable(0x1300, "x"), Some(20));
        // Globals are visible everywhere.
        assert_eq!(unit.find_variable(0x9000, "global"), Some(10));
        assert_eq!(unit.find_variable(0x9000, "x"), None);
    }
}
