use std::collections::BTreeMap;

use crate::config::GridConfig;
use crate::counters::CounterTable;
use crate::engine::{MatchOutcome, MatchWarning};
use crate::schema::{OpSchema, GLOBAL_CTR};
use crate::tag::NUM_TAGS;

/// Finished per-tile, per-tile-group, and whole-mesh counter deltas with the
/// category totals folded in. Built once from a `MatchOutcome` and read-only
/// afterwards, so it can be shared freely with any number of report writers.
pub struct StatsRollup {
    schema: OpSchema,
    grid: GridConfig,
    tile: Vec<CounterTable>,
    group: Vec<BTreeMap<u32, CounterTable>>,
    mesh: Vec<CounterTable>,
    warnings: Vec<MatchWarning>,
}

impl StatsRollup {
    pub fn build(schema: OpSchema, grid: GridConfig, outcome: MatchOutcome) -> Self {
        let slots = NUM_TAGS * grid.num_tiles();
        debug_assert_eq!(outcome.tile_start.len(), slots);

        // Tile deltas, then the mesh-wide sum per tag. Totals are folded
        // before summing; they are linear, so the order does not matter.
        let mut tile = Vec::with_capacity(slots);
        let mut mesh: Vec<CounterTable> = (0..NUM_TAGS)
            .map(|_| CounterTable::zeroed(&schema))
            .collect();
        for (slot, (end, start)) in outcome
            .tile_end
            .iter()
            .zip(&outcome.tile_start)
            .enumerate()
        {
            let mut delta = end.diff(start);
            delta.fold_totals(&schema);
            mesh[slot / grid.num_tiles()] += &delta;
            tile.push(delta);
        }

        // Group deltas diff the summed accumulators; a group observed on
        // only one side diffs against zero, mirroring the tile rule.
        let zero = CounterTable::zeroed(&schema);
        let mut group: Vec<BTreeMap<u32, CounterTable>> = Vec::with_capacity(NUM_TAGS);
        for (starts, ends) in outcome.group_start.iter().zip(&outcome.group_end) {
            let mut per_tag = BTreeMap::new();
            let ids = starts.keys().chain(ends.keys()).copied();
            for id in ids {
                per_tag.entry(id).or_insert_with(|| {
                    let start = starts.get(&id).unwrap_or(&zero);
                    let end = ends.get(&id).unwrap_or(&zero);
                    let mut delta = end.diff(start);
                    delta.fold_totals(&schema);
                    delta
                });
            }
            group.push(per_tag);
        }

        Self {
            schema,
            grid,
            tile,
            group,
            mesh,
            warnings: outcome.warnings,
        }
    }

    pub fn schema(&self) -> &OpSchema {
        &self.schema
    }

    pub fn grid(&self) -> &GridConfig {
        &self.grid
    }

    pub fn warnings(&self) -> &[MatchWarning] {
        &self.warnings
    }

    fn tile_slot(&self, tag: u32, y: usize, x: usize) -> Option<usize> {
        if (tag as usize) < NUM_TAGS && y < self.grid.dim_y && x < self.grid.dim_x {
            Some((tag as usize * self.grid.dim_y + y) * self.grid.dim_x + x)
        } else {
            None
        }
    }

    /// Delta table for one tile, origin-relative coordinates.
    pub fn tile_delta(&self, tag: u32, y: usize, x: usize) -> Option<&CounterTable> {
        self.tile_slot(tag, y, x).map(|slot| &self.tile[slot])
    }

    pub fn group_delta(&self, tag: u32, group_id: u32) -> Option<&CounterTable> {
        self.group.get(tag as usize)?.get(&group_id)
    }

    pub fn mesh_delta(&self, tag: u32) -> Option<&CounterTable> {
        self.mesh.get(tag as usize)
    }

    // By-name value queries are total: an unknown operation or a key outside
    // the observed domain reads as zero.

    pub fn tile_value(&self, tag: u32, y: usize, x: usize, op: &str) -> i64 {
        match (self.schema.op(op), self.tile_delta(tag, y, x)) {
            (Some(op), Some(delta)) => delta.get(op),
            _ => 0,
        }
    }

    pub fn group_value(&self, tag: u32, group_id: u32, op: &str) -> i64 {
        match (self.schema.op(op), self.group_delta(tag, group_id)) {
            (Some(op), Some(delta)) => delta.get(op),
            _ => 0,
        }
    }

    pub fn mesh_value(&self, tag: u32, op: &str) -> i64 {
        match (self.schema.op(op), self.mesh_delta(tag)) {
            (Some(op), Some(delta)) => delta.get(op),
            _ => 0,
        }
    }

    /// Observed tile group ids for one tag, ascending.
    pub fn group_ids(&self, tag: u32) -> impl Iterator<Item = u32> + '_ {
        self.group
            .get(tag as usize)
            .into_iter()
            .flat_map(|per_tag| per_tag.keys().copied())
    }

    pub fn num_groups(&self, tag: u32) -> usize {
        self.group.get(tag as usize).map_or(0, BTreeMap::len)
    }

    /// Whether a tag has any observed activity at mesh level. Keyed on the
    /// cycle counter when the schema has one, otherwise on any non-zero
    /// delta.
    pub fn tag_active(&self, tag: u32) -> bool {
        let Some(delta) = self.mesh_delta(tag) else {
            return false;
        };
        match self.schema.op(GLOBAL_CTR) {
            Some(op) => delta.get(op) != 0,
            None => !delta.is_zero(),
        }
    }

    pub fn active_tags(&self) -> Vec<u32> {
        (0..NUM_TAGS as u32).filter(|&t| self.tag_active(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MatchEngine;
    use crate::trace::TraceFile;

    fn grid(dim_x: usize, dim_y: usize) -> GridConfig {
        GridConfig {
            dim_x,
            dim_y,
            origin_x: 0,
            origin_y: 1,
        }
    }

    fn pack(kind: u32, y: u32, x: u32, group: u32, tag: u32) -> u32 {
        (kind << 30) | (y << 24) | (x << 18) | (group << 4) | tag
    }

    fn rollup(csv: &str, grid: GridConfig) -> StatsRollup {
        let trace = TraceFile::parse(csv).unwrap();
        let mut engine = MatchEngine::new(&trace.schema, grid);
        for record in &trace.records {
            engine.process(record).unwrap();
        }
        let outcome = engine.finish();
        StatsRollup::build(trace.schema, grid, outcome)
    }

    #[test]
    fn single_pair_end_to_end() {
        // 1x1 mesh, one start/end window on tag 0.
        let csv = format!(
            "tag,x,y,global_ctr,instr_add\n{},0,1,100,5\n{},0,1,160,15\n",
            pack(1, 1, 0, 0, 0),
            pack(2, 1, 0, 0, 0)
        );
        let rollup = rollup(&csv, grid(1, 1));

        assert_eq!(rollup.tile_value(0, 0, 0, "instr_add"), 10);
        assert_eq!(rollup.tile_value(0, 0, 0, "instr_total"), 10);
        assert_eq!(rollup.tile_value(0, 0, 0, "global_ctr"), 60);
        assert_eq!(rollup.mesh_value(0, "instr_add"), 10);
        assert!(rollup.warnings().is_empty());
        assert_eq!(rollup.active_tags(), vec![0]);
    }

    #[test]
    fn mesh_is_the_sum_of_tile_deltas() {
        // Two tiles on a 2x1 mesh, one window each.
        let csv = format!(
            "tag,x,y,global_ctr,instr_add\n\
             {},0,1,0,0\n{},1,1,0,0\n{},0,1,50,7\n{},1,1,80,9\n",
            pack(1, 1, 0, 0, 3),
            pack(1, 1, 1, 0, 3),
            pack(2, 1, 0, 0, 3),
            pack(2, 1, 1, 0, 3)
        );
        let rollup = rollup(&csv, grid(2, 1));

        for op in ["global_ctr", "instr_add", "instr_total"] {
            let tiles: i64 =
                (0..2).map(|x| rollup.tile_value(3, 0, x, op)).sum();
            assert_eq!(rollup.mesh_value(3, op), tiles, "op {}", op);
        }
        assert_eq!(rollup.mesh_value(3, "global_ctr"), 130);
    }

    #[test]
    fn group_delta_diffs_summed_snapshots() {
        // Both tiles report group 2; accumulators sum before differencing.
        let csv = format!(
            "tag,x,y,global_ctr,instr_add\n\
             {},0,1,10,1\n{},1,1,20,2\n{},0,1,110,3\n{},1,1,220,4\n",
            pack(1, 1, 0, 2, 0),
            pack(1, 1, 1, 2, 0),
            pack(2, 1, 0, 2, 0),
            pack(2, 1, 1, 2, 0)
        );
        let rollup = rollup(&csv, grid(2, 1));

        // (110 + 220) - (10 + 20), (3 + 4) - (1 + 2)
        assert_eq!(rollup.group_value(0, 2, "global_ctr"), 300);
        assert_eq!(rollup.group_value(0, 2, "instr_add"), 4);
        assert_eq!(rollup.group_value(0, 2, "instr_total"), 4);
        assert_eq!(rollup.group_ids(0).collect::<Vec<_>>(), vec![2]);
        assert_eq!(rollup.num_groups(0), 1);
    }

    #[test]
    fn missing_start_delta_uses_zero_baseline() {
        let csv = format!("tag,x,y,cycle\n{},0,1,10\n", pack(2, 1, 0, 0, 0));
        let rollup = rollup(&csv, grid(1, 1));

        assert_eq!(rollup.warnings().len(), 1);
        assert!(matches!(
            rollup.warnings()[0],
            MatchWarning::MissingStart { tag: 0, x: 0, y: 0 }
        ));
        assert_eq!(rollup.tile_value(0, 0, 0, "cycle"), 10);
    }

    #[test]
    fn queries_are_total_over_the_domain() {
        let csv = format!(
            "tag,x,y,cycle\n{},0,1,1\n{},0,1,2\n",
            pack(1, 1, 0, 0, 0),
            pack(2, 1, 0, 0, 0)
        );
        let rollup = rollup(&csv, grid(1, 1));

        assert_eq!(rollup.tile_value(0, 0, 0, "no_such_op"), 0);
        assert_eq!(rollup.tile_value(15, 0, 0, "cycle"), 0);
        assert_eq!(rollup.group_value(0, 999, "cycle"), 0);
        assert_eq!(rollup.mesh_value(9, "cycle"), 0);
        assert_eq!(rollup.num_groups(9), 0);
    }

    #[test]
    fn tags_without_cycle_activity_are_inactive() {
        let csv = format!(
            "tag,x,y,global_ctr\n{},0,1,100\n{},0,1,100\n",
            pack(1, 1, 0, 0, 4),
            pack(2, 1, 0, 0, 4)
        );
        let rollup = rollup(&csv, grid(1, 1));
        // The window closed but elapsed zero cycles.
        assert!(!rollup.tag_active(4));
        assert!(rollup.active_tags().is_empty());
    }
}
