use std::fs;
use std::path::Path;

use log::info;

use crate::counters::CounterTable;
use crate::error::StatError;
use crate::schema::{OpId, OpSchema};

/// One row of the counter trace: the tile's absolute coordinates, the raw
/// packed tag word, and a snapshot value for every header operation.
#[derive(Debug, Clone)]
pub struct TraceRecord {
    pub x: u32,
    pub y: u32,
    pub tag: u32,
    pub counts: CounterTable,
}

/// A fully materialized trace: the schema discovered from the header plus
/// every record in file order. Nothing is processed lazily; the matcher
/// folds over `records` after the whole file is read.
#[derive(Debug)]
pub struct TraceFile {
    pub schema: OpSchema,
    pub records: Vec<TraceRecord>,
}

const TAG_COLUMN: &str = "tag";
const X_COLUMN: &str = "x";
const Y_COLUMN: &str = "y";

impl TraceFile {
    pub fn load(path: &Path) -> Result<Self, StatError> {
        let text = fs::read_to_string(path).map_err(|source| StatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trace = Self::parse(&text)?;
        info!(
            "loaded {} trace records, {} counter columns",
            trace.records.len(),
            trace.schema.num_header_ops()
        );
        Ok(trace)
    }

    pub fn parse(text: &str) -> Result<Self, StatError> {
        let mut lines = text.lines().enumerate();
        let (_, header) = lines.next().ok_or(StatError::EmptyInput)?;
        let columns: Vec<&str> = header.split(',').map(str::trim).collect();

        let find = |name: &str| {
            columns
                .iter()
                .position(|&c| c == name)
                .ok_or_else(|| StatError::MissingColumn(name.to_string()))
        };
        let tag_pos = find(TAG_COLUMN)?;
        let x_pos = find(X_COLUMN)?;
        let y_pos = find(Y_COLUMN)?;

        // Every column that is not one of the three addressing fields is a
        // counter operation; categories come from the name prefix.
        let op_positions: Vec<usize> = (0..columns.len())
            .filter(|&i| i != tag_pos && i != x_pos && i != y_pos)
            .collect();
        let schema = OpSchema::from_columns(op_positions.iter().map(|&i| columns[i].to_string()));

        // Schema construction drops duplicate columns and any `*_total` the
        // header already carries, so map positions through a name lookup
        // rather than assuming a one-to-one zip. Dropped columns are still
        // parsed and validated; their values just land nowhere.
        let op_slots: Vec<(usize, Option<OpId>)> = op_positions
            .iter()
            .map(|&i| {
                let op = schema
                    .op(columns[i])
                    .filter(|op| op.0 < schema.num_header_ops());
                (i, op)
            })
            .collect();

        let mut records = Vec::new();
        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != columns.len() {
                return Err(StatError::ColumnCount {
                    line: index + 1,
                    expected: columns.len(),
                    found: fields.len(),
                });
            }

            let parse = |pos: usize| -> Result<u64, StatError> {
                fields[pos]
                    .parse::<u64>()
                    .map_err(|_| StatError::MalformedField {
                        line: index + 1,
                        column: columns[pos].to_string(),
                        value: fields[pos].to_string(),
                    })
            };

            let parse_u32 = |pos: usize| -> Result<u32, StatError> {
                parse(pos).and_then(|v| {
                    u32::try_from(v).map_err(|_| StatError::MalformedField {
                        line: index + 1,
                        column: columns[pos].to_string(),
                        value: fields[pos].to_string(),
                    })
                })
            };

            let mut counts = CounterTable::zeroed(&schema);
            for &(pos, op) in &op_slots {
                let value = parse(pos).and_then(|v| {
                    i64::try_from(v).map_err(|_| StatError::MalformedField {
                        line: index + 1,
                        column: columns[pos].to_string(),
                        value: fields[pos].to_string(),
                    })
                })?;
                if let Some(op) = op {
                    counts.set(op, value);
                }
            }
            records.push(TraceRecord {
                x: parse_u32(x_pos)?,
                y: parse_u32(y_pos)?,
                tag: parse_u32(tag_pos)?,
                counts,
            });
        }

        Ok(Self { schema, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_rows() {
        let trace = TraceFile::parse(
            "tag,x,y,global_ctr,instr_add\n\
             0,0,1,100,5\n\
             2147483648,0,1,200,15\n",
        )
        .unwrap();

        assert_eq!(trace.schema.num_header_ops(), 2);
        assert_eq!(trace.records.len(), 2);
        let op = trace.schema.op("instr_add").unwrap();
        assert_eq!(trace.records[0].counts.get(op), 5);
        assert_eq!(trace.records[1].tag, 0x8000_0000);
    }

    #[test]
    fn rejects_non_integer_field() {
        let err = TraceFile::parse("tag,x,y,cycle\n0,0,1,oops\n").unwrap_err();
        match err {
            StatError::MalformedField { line, column, .. } => {
                assert_eq!(line, 2);
                assert_eq!(column, "cycle");
            }
            other => panic!("expected MalformedField, got {:?}", other),
        }
    }

    #[test]
    fn rejects_counter_above_signed_range() {
        // Parses as u64 but cannot be stored as a signed delta operand.
        let err = TraceFile::parse("tag,x,y,cycle\n0,0,1,9300000000000000000\n").unwrap_err();
        match err {
            StatError::MalformedField { line, column, .. } => {
                assert_eq!(line, 2);
                assert_eq!(column, "cycle");
            }
            other => panic!("expected MalformedField, got {:?}", other),
        }
    }

    #[test]
    fn rejects_short_row() {
        let err = TraceFile::parse("tag,x,y,cycle\n0,0,1\n").unwrap_err();
        assert!(matches!(err, StatError::ColumnCount { line: 2, .. }));
    }

    #[test]
    fn rejects_missing_required_column() {
        let err = TraceFile::parse("x,y,cycle\n").unwrap_err();
        assert!(matches!(err, StatError::MissingColumn(name) if name == "tag"));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(TraceFile::parse(""), Err(StatError::EmptyInput)));
    }

    #[test]
    fn header_total_column_does_not_shift_later_columns() {
        // instr_total is dropped from the schema; the column after it must
        // still land in the right slot.
        let trace = TraceFile::parse("tag,x,y,instr_add,instr_total,instr_lw\n0,0,1,5,99,7\n").unwrap();
        assert_eq!(trace.schema.num_header_ops(), 2);
        let add = trace.schema.op("instr_add").unwrap();
        let lw = trace.schema.op("instr_lw").unwrap();
        assert_eq!(trace.records[0].counts.get(add), 5);
        assert_eq!(trace.records[0].counts.get(lw), 7);
        // The dropped column's value never reaches the synthetic slot.
        assert_eq!(trace.records[0].counts.get(trace.schema.instr_total()), 0);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let trace = TraceFile::parse("tag,x,y,cycle\n0,0,1,10\n\n").unwrap();
        assert_eq!(trace.records.len(), 1);
    }
}
