/// Experience points dropped per kill, keyed by victim kind.
///
/// The table is built once at startup (built-in values merged with any
/// `[xp]` overrides from config) and handed to the engine. It is only read
/// when a farming summary is formatted.
///
/// Slimes and magma cubes drop XP by size; they carry a flat placeholder
/// here like everything else.
use std::collections::HashMap;

const DEFAULT_NAMESPACE: &str = "minecraft";

// ---------------------------------------------------------------------------
// Built-in values
// ---------------------------------------------------------------------------

static BUILTIN_XP: &[(&str, u32)] = &[
    // Common hostiles
    ("minecraft:zombie",           5),
    ("minecraft:husk",             5),
    ("minecraft:drowned",          5),
    ("minecraft:zombified_piglin", 5),
    ("minecraft:zoglin",           5),
    ("minecraft:skeleton",         5),
    ("minecraft:stray",            5),
    ("minecraft:wither_skeleton",  5),
    ("minecraft:creeper",          5),
    ("minecraft:spider",           5),
    ("minecraft:cave_spider",      5),
    ("minecraft:enderman",         5),
    ("minecraft:ghast",            5),
    ("minecraft:piglin",           5),
    ("minecraft:hoglin",           5),
    ("minecraft:vindicator",       5),
    ("minecraft:pillager",         5),
    ("minecraft:witch",            5),
    ("minecraft:phantom",          5),
    ("minecraft:shulker",          5),
    ("minecraft:silverfish",       5),
    ("minecraft:warden",           5),
    // 10 XP
    ("minecraft:blaze",            10),
    ("minecraft:guardian",         10),
    ("minecraft:elder_guardian",   10),
    ("minecraft:evoker",           10),
    // Odd ones
    ("minecraft:piglin_brute",     20),
    ("minecraft:ravager",          20),
    ("minecraft:endermite",        3),
    ("minecraft:wither",           50),
    ("minecraft:ender_dragon",     12_000),
    // Size-based in game, flat here
    ("minecraft:magma_cube",       2),
    ("minecraft:slime",            2),
];

// ---------------------------------------------------------------------------
// XpTable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct XpTable {
    values: HashMap<String, u32>,
}

impl XpTable {
    pub fn builtin() -> Self {
        Self {
            values: BUILTIN_XP
                .iter()
                .map(|(kind, xp)| ((*kind).to_owned(), *xp))
                .collect(),
        }
    }

    /// Built-in table with `overrides` layered on top. Override keys without
    /// a namespace are treated as `minecraft:` kinds.
    pub fn with_overrides(overrides: &HashMap<String, u32>) -> Self {
        let mut table = Self::builtin();
        for (kind, xp) in overrides {
            table.values.insert(qualify(kind), *xp);
        }
        table
    }

    /// Points for one kill of `kind`; unknown kinds are worth nothing.
    pub fn value_of(&self, kind: &str) -> u32 {
        self.values
            .get(kind)
            .or_else(|| self.values.get(&qualify(kind)))
            .copied()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl Default for XpTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn qualify(kind: &str) -> String {
    if kind.contains(':') {
        kind.to_owned()
    } else {
        format!("{}:{}", DEFAULT_NAMESPACE, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_values() {
        let table = XpTable::builtin();
        assert_eq!(table.value_of("minecraft:zombie"), 5);
        assert_eq!(table.value_of("minecraft:blaze"), 10);
        assert_eq!(table.value_of("minecraft:ender_dragon"), 12_000);
        assert_eq!(table.len(), BUILTIN_XP.len());
    }

    #[test]
    fn unknown_kind_is_zero() {
        assert_eq!(XpTable::builtin().value_of("minecraft:cow"), 0);
        assert_eq!(XpTable::builtin().value_of(""), 0);
    }

    #[test]
    fn bare_kind_resolves_to_default_namespace() {
        assert_eq!(XpTable::builtin().value_of("skeleton"), 5);
    }

    #[test]
    fn overrides_win() {
        let mut overrides = HashMap::new();
        overrides.insert("slime".to_owned(), 4);
        overrides.insert("mymod:golem".to_owned(), 30);
        let table = XpTable::with_overrides(&overrides);
        assert_eq!(table.value_of("minecraft:slime"), 4);
        assert_eq!(table.value_of("mymod:golem"), 30);
        assert_eq!(table.value_of("minecraft:zombie"), 5);
    }
}
