use std::collections::BTreeMap;
use std::fmt;

use log::warn;

use crate::config::GridConfig;
use crate::counters::CounterTable;
use crate::error::StatError;
use crate::schema::OpSchema;
use crate::tag::{EventKind, StatTag, NUM_TAGS};
use crate::trace::TraceRecord;

/// Non-fatal pairing anomalies. The fold keeps going; these are surfaced to
/// the log and carried alongside the aggregates so the report layer can flag
/// windows whose deltas are not meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchWarning {
    /// An end snapshot arrived with no pending start for its key; its delta
    /// is computed against a zero baseline.
    MissingStart { tag: u32, x: usize, y: usize },
    /// Residual start credit after the whole trace was consumed; the key's
    /// last window never closed.
    MissingEnd { tag: u32, x: usize, y: usize, credit: i64 },
}

impl fmt::Display for MatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchWarning::MissingStart { tag, x, y } => {
                write!(f, "missing start stat for tag {}, tile {},{}", tag, x, y)
            }
            MatchWarning::MissingEnd { tag, x, y, credit } => {
                write!(
                    f,
                    "{} missing end stat(s) for tag {}, tile {},{}",
                    credit, tag, x, y
                )
            }
        }
    }
}

/// Raw pairing state after the full trace has been folded: last-seen start
/// and end snapshots per (tag, tile), summed start and end snapshots per
/// (tag, group), and the warnings collected along the way. Consumed by
/// `rollup::StatsRollup::build`.
pub struct MatchOutcome {
    pub tile_start: Vec<CounterTable>,
    pub tile_end: Vec<CounterTable>,
    pub group_start: Vec<BTreeMap<u32, CounterTable>>,
    pub group_end: Vec<BTreeMap<u32, CounterTable>>,
    pub warnings: Vec<MatchWarning>,
}

/// Stateful start/end matcher. Owns all pairing state during the fold;
/// nothing else reads it until `finish`.
///
/// Tile tables are dense over (tag, y, x) and preallocated with zeroed
/// counters, so an end with no recorded start naturally diffs against a zero
/// baseline. The group axis is sparse; entries appear on first observation.
pub struct MatchEngine<'a> {
    schema: &'a OpSchema,
    grid: GridConfig,
    credits: Vec<i64>,
    tile_start: Vec<CounterTable>,
    tile_end: Vec<CounterTable>,
    group_start: Vec<BTreeMap<u32, CounterTable>>,
    group_end: Vec<BTreeMap<u32, CounterTable>>,
    warnings: Vec<MatchWarning>,
}

impl<'a> MatchEngine<'a> {
    pub fn new(schema: &'a OpSchema, grid: GridConfig) -> Self {
        let slots = NUM_TAGS * grid.num_tiles();
        Self {
            schema,
            grid,
            credits: vec![0; slots],
            tile_start: vec![CounterTable::zeroed(schema); slots],
            tile_end: vec![CounterTable::zeroed(schema); slots],
            group_start: (0..NUM_TAGS).map(|_| BTreeMap::new()).collect(),
            group_end: (0..NUM_TAGS).map(|_| BTreeMap::new()).collect(),
            warnings: Vec::new(),
        }
    }

    fn slot(&self, tag: u32, ry: usize, rx: usize) -> usize {
        (tag as usize * self.grid.dim_y + ry) * self.grid.dim_x + rx
    }

    pub fn process(&mut self, record: &TraceRecord) -> Result<(), StatError> {
        let stat_tag = StatTag::decode(record.tag)?;
        let (ry, rx) = self.grid.relative(record.x, record.y)?;
        let slot = self.slot(stat_tag.tag, ry, rx);

        match stat_tag.kind {
            // Stand-alone stats are not windowed; the matcher skips them.
            EventKind::Stat => {}
            EventKind::Start => {
                self.credits[slot] += 1;
                // Last write wins: a second start before a matching end
                // discards the previous pending snapshot.
                self.tile_start[slot] = record.counts.clone();
                let acc = self.group_start[stat_tag.tag as usize]
                    .entry(stat_tag.group_id)
                    .or_insert_with(|| CounterTable::zeroed(self.schema));
                *acc += &record.counts;
            }
            EventKind::End => {
                self.credits[slot] -= 1;
                if self.credits[slot] < 0 {
                    let warning = MatchWarning::MissingStart {
                        tag: stat_tag.tag,
                        x: rx,
                        y: ry,
                    };
                    warn!("{}", warning);
                    self.warnings.push(warning);
                }
                self.tile_end[slot] = record.counts.clone();
                let acc = self.group_end[stat_tag.tag as usize]
                    .entry(stat_tag.group_id)
                    .or_insert_with(|| CounterTable::zeroed(self.schema));
                *acc += &record.counts;
            }
        }
        Ok(())
    }

    /// Scan for starts that never closed, then hand the pairing state over.
    /// The residual-credit warnings are diagnostic only; they do not alter
    /// any snapshot.
    pub fn finish(mut self) -> MatchOutcome {
        for tag in 0..NUM_TAGS {
            for ry in 0..self.grid.dim_y {
                for rx in 0..self.grid.dim_x {
                    let credit = self.credits[self.slot(tag as u32, ry, rx)];
                    if credit > 0 {
                        let warning = MatchWarning::MissingEnd {
                            tag: tag as u32,
                            x: rx,
                            y: ry,
                            credit,
                        };
                        warn!("{}", warning);
                        self.warnings.push(warning);
                    }
                }
            }
        }

        MatchOutcome {
            tile_start: self.tile_start,
            tile_end: self.tile_end,
            group_start: self.group_start,
            group_end: self.group_end,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceFile;

    fn grid_1x1() -> GridConfig {
        GridConfig {
            dim_x: 1,
            dim_y: 1,
            origin_x: 0,
            origin_y: 1,
        }
    }

    // kind | y | x | group | tag, per the packed-word layout
    fn pack(kind: u32, y: u32, x: u32, group: u32, tag: u32) -> u32 {
        (kind << 30) | (y << 24) | (x << 18) | (group << 4) | tag
    }

    fn fold(csv: &str, grid: GridConfig) -> (OpSchema, MatchOutcome) {
        let trace = TraceFile::parse(csv).unwrap();
        let mut engine = MatchEngine::new(&trace.schema, grid);
        for record in &trace.records {
            engine.process(record).unwrap();
        }
        let outcome = engine.finish();
        (trace.schema, outcome)
    }

    #[test]
    fn start_end_pair_records_both_snapshots() {
        let csv = format!(
            "tag,x,y,cycle\n{},0,1,100\n{},0,1,160\n",
            pack(1, 1, 0, 0, 0),
            pack(2, 1, 0, 0, 0)
        );
        let (schema, outcome) = fold(&csv, grid_1x1());
        let op = schema.op("cycle").unwrap();
        assert_eq!(outcome.tile_start[0].get(op), 100);
        assert_eq!(outcome.tile_end[0].get(op), 160);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn end_without_start_warns_and_keeps_zero_baseline() {
        let csv = format!("tag,x,y,cycle\n{},0,1,10\n", pack(2, 1, 0, 0, 0));
        let (schema, outcome) = fold(&csv, grid_1x1());
        assert_eq!(
            outcome.warnings,
            vec![MatchWarning::MissingStart { tag: 0, x: 0, y: 0 }]
        );
        let op = schema.op("cycle").unwrap();
        assert_eq!(outcome.tile_start[0].get(op), 0);
        assert_eq!(outcome.tile_end[0].get(op), 10);
    }

    #[test]
    fn dangling_start_warns_after_the_stream() {
        let csv = format!("tag,x,y,cycle\n{},0,1,10\n", pack(1, 1, 0, 0, 0));
        let (_, outcome) = fold(&csv, grid_1x1());
        assert_eq!(
            outcome.warnings,
            vec![MatchWarning::MissingEnd {
                tag: 0,
                x: 0,
                y: 0,
                credit: 1
            }]
        );
    }

    #[test]
    fn second_start_overwrites_pending_snapshot() {
        let csv = format!(
            "tag,x,y,cycle\n{},0,1,100\n{},0,1,150\n{},0,1,200\n",
            pack(1, 1, 0, 0, 0),
            pack(1, 1, 0, 0, 0),
            pack(2, 1, 0, 0, 0)
        );
        let (schema, outcome) = fold(&csv, grid_1x1());
        let op = schema.op("cycle").unwrap();
        assert_eq!(outcome.tile_start[0].get(op), 150);
        // The double start leaves one unmatched credit.
        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(
            outcome.warnings[0],
            MatchWarning::MissingEnd { credit: 1, .. }
        ));
    }

    #[test]
    fn group_accumulators_sum_across_tiles() {
        let grid = GridConfig {
            dim_x: 2,
            dim_y: 1,
            origin_x: 0,
            origin_y: 1,
        };
        let csv = format!(
            "tag,x,y,cycle\n{},0,1,100\n{},1,1,300\n",
            pack(1, 1, 0, 5, 0),
            pack(1, 1, 1, 5, 0)
        );
        let (schema, outcome) = fold(&csv, grid);
        let op = schema.op("cycle").unwrap();
        let acc = &outcome.group_start[0][&5];
        assert_eq!(acc.get(op), 400);
    }

    #[test]
    fn stat_kind_records_are_ignored() {
        let csv = format!("tag,x,y,cycle\n{},0,1,42\n", pack(0, 1, 0, 0, 0));
        let (schema, outcome) = fold(&csv, grid_1x1());
        let op = schema.op("cycle").unwrap();
        assert_eq!(outcome.tile_start[0].get(op), 0);
        assert_eq!(outcome.tile_end[0].get(op), 0);
        assert!(outcome.warnings.is_empty());
        assert!(outcome.group_start[0].is_empty());
    }

    #[test]
    fn out_of_mesh_coordinate_is_fatal() {
        let trace = TraceFile::parse(&format!("tag,x,y,cycle\n{},7,1,1\n", pack(1, 1, 7, 0, 0)))
            .unwrap();
        let mut engine = MatchEngine::new(&trace.schema, grid_1x1());
        let err = engine.process(&trace.records[0]).unwrap_err();
        assert!(matches!(err, StatError::TileOutOfBounds { .. }));
    }
}
