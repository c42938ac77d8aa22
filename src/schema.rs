use std::collections::HashMap;

use serde::Serialize;

/// Category of a counter column, inferred from its name prefix at schema
/// construction time and never re-derived afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpClass {
    Stat,
    Instr,
    Miss,
    Stall,
}

/// Dense index of an operation within a schema. Counter tables are flat
/// vectors indexed by `OpId`, so lookups by name happen once, at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpId(pub usize);

pub const INSTR_TOTAL: &str = "instr_total";
pub const STALL_TOTAL: &str = "stall_total";
pub const MISS_TOTAL: &str = "miss_total";

/// Conventional name of the cycle counter column. The core treats it as an
/// ordinary stat; the report layer keys timing shares on it.
pub const GLOBAL_CTR: &str = "global_ctr";

/// Ordered catalogue of counter operations for one run, built from the input
/// header and immutable afterwards. The three synthetic category totals
/// occupy the last three slots; they are excluded from the per-category
/// lists used to compute them.
#[derive(Debug, Clone)]
pub struct OpSchema {
    names: Vec<String>,
    classes: Vec<OpClass>,
    index: HashMap<String, usize>,
    stats: Vec<OpId>,
    instrs: Vec<OpId>,
    misses: Vec<OpId>,
    stalls: Vec<OpId>,
    num_header_ops: usize,
}

pub fn classify(name: &str) -> OpClass {
    if name.starts_with("instr_") {
        OpClass::Instr
    } else if name.starts_with("miss_") {
        OpClass::Miss
    } else if name.starts_with("stall_") {
        OpClass::Stall
    } else {
        OpClass::Stat
    }
}

impl OpSchema {
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self {
            names: Vec::new(),
            classes: Vec::new(),
            index: HashMap::new(),
            stats: Vec::new(),
            instrs: Vec::new(),
            misses: Vec::new(),
            stalls: Vec::new(),
            num_header_ops: 0,
        };

        for column in columns {
            let name = column.into();
            // Totals are recomputed from the categories; a header that
            // already carries them must not double-count.
            if name == INSTR_TOTAL || name == STALL_TOTAL || name == MISS_TOTAL {
                continue;
            }
            if schema.index.contains_key(&name) {
                continue;
            }
            let id = OpId(schema.names.len());
            let class = classify(&name);
            match class {
                OpClass::Stat => schema.stats.push(id),
                OpClass::Instr => schema.instrs.push(id),
                OpClass::Miss => schema.misses.push(id),
                OpClass::Stall => schema.stalls.push(id),
            }
            schema.index.insert(name.clone(), id.0);
            schema.names.push(name);
            schema.classes.push(class);
        }

        schema.num_header_ops = schema.names.len();
        for (name, class) in [
            (INSTR_TOTAL, OpClass::Instr),
            (STALL_TOTAL, OpClass::Stall),
            (MISS_TOTAL, OpClass::Miss),
        ] {
            schema.index.insert(name.to_string(), schema.names.len());
            schema.names.push(name.to_string());
            schema.classes.push(class);
        }

        schema
    }

    /// Total number of slots in a counter table for this schema, synthetic
    /// totals included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_header_ops == 0
    }

    /// Number of operations that came from the header (and therefore appear
    /// in every input row), excluding the synthetic totals.
    pub fn num_header_ops(&self) -> usize {
        self.num_header_ops
    }

    pub fn op(&self, name: &str) -> Option<OpId> {
        self.index.get(name).copied().map(OpId)
    }

    pub fn name(&self, op: OpId) -> &str {
        &self.names[op.0]
    }

    pub fn class(&self, op: OpId) -> OpClass {
        self.classes[op.0]
    }

    /// Header-derived operations in input-column order.
    pub fn header_ops(&self) -> impl Iterator<Item = OpId> + '_ {
        (0..self.num_header_ops).map(OpId)
    }

    pub fn stats(&self) -> &[OpId] {
        &self.stats
    }

    pub fn instrs(&self) -> &[OpId] {
        &self.instrs
    }

    pub fn misses(&self) -> &[OpId] {
        &self.misses
    }

    pub fn stalls(&self) -> &[OpId] {
        &self.stalls
    }

    pub fn instr_total(&self) -> OpId {
        OpId(self.num_header_ops)
    }

    pub fn stall_total(&self) -> OpId {
        OpId(self.num_header_ops + 1)
    }

    pub fn miss_total(&self) -> OpId {
        OpId(self.num_header_ops + 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_columns_by_prefix() {
        let schema = OpSchema::from_columns([
            "global_ctr",
            "instr_add",
            "instr_lw",
            "miss_icache",
            "stall_depend",
            "cycle",
        ]);

        assert_eq!(schema.num_header_ops(), 6);
        assert_eq!(schema.len(), 9);
        assert_eq!(schema.stats().len(), 2);
        assert_eq!(schema.instrs().len(), 2);
        assert_eq!(schema.misses().len(), 1);
        assert_eq!(schema.stalls().len(), 1);
        assert_eq!(schema.class(schema.op("instr_lw").unwrap()), OpClass::Instr);
        assert_eq!(schema.class(schema.op("cycle").unwrap()), OpClass::Stat);
    }

    #[test]
    fn header_totals_are_dropped_not_double_counted() {
        let schema = OpSchema::from_columns(["instr_add", "instr_total", "stall_total"]);
        assert_eq!(schema.num_header_ops(), 1);
        assert_eq!(schema.instrs().len(), 1);
        // The synthetic slot is still resolvable by name.
        assert_eq!(schema.op(INSTR_TOTAL), Some(schema.instr_total()));
    }

    #[test]
    fn totals_occupy_trailing_slots() {
        let schema = OpSchema::from_columns(["a", "instr_b"]);
        assert_eq!(schema.name(schema.instr_total()), INSTR_TOTAL);
        assert_eq!(schema.name(schema.stall_total()), STALL_TOTAL);
        assert_eq!(schema.name(schema.miss_total()), MISS_TOTAL);
        assert!(!schema.instrs().contains(&schema.instr_total()));
    }
}
