use std::ops::AddAssign;

use crate::schema::{OpId, OpSchema};

/// One counter value per schema operation, synthetic totals included. Every
/// slot exists from construction with value zero; there is no absent-key
/// state. Deltas may legitimately go negative and are never clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterTable {
    values: Vec<i64>,
}

impl CounterTable {
    pub fn zeroed(schema: &OpSchema) -> Self {
        Self {
            values: vec![0; schema.len()],
        }
    }

    pub fn get(&self, op: OpId) -> i64 {
        self.values[op.0]
    }

    pub fn set(&mut self, op: OpId, value: i64) {
        self.values[op.0] = value;
    }

    pub fn add(&mut self, op: OpId, value: i64) {
        self.values[op.0] += value;
    }

    /// Element-wise End − Start.
    pub fn diff(&self, start: &CounterTable) -> CounterTable {
        debug_assert_eq!(self.values.len(), start.values.len());
        CounterTable {
            values: self
                .values
                .iter()
                .zip(&start.values)
                .map(|(end, start)| end - start)
                .collect(),
        }
    }

    /// Sum each category's fields into its synthetic total slot. Overwrites
    /// any previous total, so folding twice is harmless.
    pub fn fold_totals(&mut self, schema: &OpSchema) {
        let instr: i64 = schema.instrs().iter().map(|&op| self.get(op)).sum();
        let stall: i64 = schema.stalls().iter().map(|&op| self.get(op)).sum();
        let miss: i64 = schema.misses().iter().map(|&op| self.get(op)).sum();
        self.set(schema.instr_total(), instr);
        self.set(schema.stall_total(), stall);
        self.set(schema.miss_total(), miss);
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0)
    }
}

impl AddAssign<&CounterTable> for CounterTable {
    fn add_assign(&mut self, other: &CounterTable) {
        debug_assert_eq!(self.values.len(), other.values.len());
        for (dst, src) in self.values.iter_mut().zip(&other.values) {
            *dst += src;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> OpSchema {
        OpSchema::from_columns(["global_ctr", "instr_add", "instr_lw", "stall_depend", "miss_dram"])
    }

    #[test]
    fn diff_passes_negatives_through() {
        let schema = schema();
        let op = schema.op("instr_add").unwrap();
        let mut start = CounterTable::zeroed(&schema);
        let mut end = CounterTable::zeroed(&schema);
        start.set(op, 20);
        end.set(op, 5);
        assert_eq!(end.diff(&start).get(op), -15);
    }

    #[test]
    fn fold_totals_sums_each_category() {
        let schema = schema();
        let mut table = CounterTable::zeroed(&schema);
        table.set(schema.op("instr_add").unwrap(), 3);
        table.set(schema.op("instr_lw").unwrap(), 4);
        table.set(schema.op("stall_depend").unwrap(), 9);
        table.set(schema.op("miss_dram").unwrap(), 2);
        table.set(schema.op("global_ctr").unwrap(), 100);

        table.fold_totals(&schema);
        assert_eq!(table.get(schema.instr_total()), 7);
        assert_eq!(table.get(schema.stall_total()), 9);
        assert_eq!(table.get(schema.miss_total()), 2);
    }

    #[test]
    fn accumulate_is_element_wise() {
        let schema = schema();
        let op = schema.op("global_ctr").unwrap();
        let mut acc = CounterTable::zeroed(&schema);
        let mut one = CounterTable::zeroed(&schema);
        one.set(op, 7);
        acc += &one;
        acc += &one;
        assert_eq!(acc.get(op), 14);
    }
}
