use std::fs;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::info;
use serde::Serialize;

use crate::config::ReportConfig;
use crate::rollup::StatsRollup;
use crate::schema::{GLOBAL_CTR, INSTR_TOTAL, MISS_TOTAL, STALL_TOTAL};
use crate::tag::{KERNEL_TAG, NUM_TAGS};

// Column formats shared by every section, kept in one place so the reports
// stay visually aligned.
fn fmt_name(s: &str) -> String {
    format!("{:<35}", s)
}

fn fmt_head(s: &str) -> String {
    format!("{:>20}", s)
}

fn fmt_int(v: i64) -> String {
    format!("{:>20}", v)
}

fn fmt_float(v: f64) -> String {
    format!("{:>20.4}", v)
}

fn fmt_pct(v: f64) -> String {
    format!("{:>20.2}", v)
}

fn fmt_cord(y: usize, x: usize) -> String {
    format!("{:<2}, {:<31}", y, x)
}

const LBREAK_WIDTH: usize = 160;

fn ratio(num: i64, den: i64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn pct(num: i64, den: i64) -> f64 {
    100.0 * ratio(num, den)
}

/// Which slice of the rollup a report file covers.
#[derive(Clone, Copy)]
enum Scope {
    Mesh,
    Group(u32),
    Tile { y: usize, x: usize },
}

impl Scope {
    fn value(&self, rollup: &StatsRollup, tag: u32, op: &str) -> i64 {
        match *self {
            Scope::Mesh => rollup.mesh_value(tag, op),
            Scope::Group(id) => rollup.group_value(tag, id, op),
            Scope::Tile { y, x } => rollup.tile_value(tag, y, x, op),
        }
    }

    fn active(&self, rollup: &StatsRollup, tag: u32) -> bool {
        if rollup.schema().op(GLOBAL_CTR).is_some() {
            return self.value(rollup, tag, GLOBAL_CTR) != 0;
        }
        match *self {
            Scope::Mesh => rollup.mesh_delta(tag).is_some_and(|d| !d.is_zero()),
            Scope::Group(id) => rollup.group_delta(tag, id).is_some_and(|d| !d.is_zero()),
            Scope::Tile { y, x } => rollup.tile_delta(tag, y, x).is_some_and(|d| !d.is_zero()),
        }
    }
}

pub struct ReportWriter<'a> {
    rollup: &'a StatsRollup,
}

impl<'a> ReportWriter<'a> {
    pub fn new(rollup: &'a StatsRollup) -> Self {
        Self { rollup }
    }

    /// Write the mesh-level report, the JSON summary, and (if configured)
    /// one report file per tile and per tile group.
    pub fn write_all(&self, config: &ReportConfig) -> io::Result<()> {
        fs::create_dir_all(&config.out_dir)?;

        let mesh_path = config.out_dir.join("manycore_stats.log");
        let mut out = BufWriter::new(File::create(&mesh_path)?);
        self.write_mesh_report(&mut out)?;
        out.flush()?;
        info!("wrote {}", mesh_path.display());

        self.write_summary_json(&config.out_dir)?;

        if config.per_tile_group {
            let dir = config.out_dir.join("tile_group");
            fs::create_dir_all(&dir)?;
            for id in self.observed_group_ids() {
                let path = dir.join(format!("tile_group_{}_stats.log", id));
                let mut out = BufWriter::new(File::create(path)?);
                self.write_scope_report(&mut out, Scope::Group(id))?;
                out.flush()?;
            }
        }

        if config.per_tile {
            let dir = config.out_dir.join("tile");
            fs::create_dir_all(&dir)?;
            for y in 0..self.rollup.grid().dim_y {
                for x in 0..self.rollup.grid().dim_x {
                    let path = dir.join(format!("tile_{}_{}_stats.log", y, x));
                    let mut out = BufWriter::new(File::create(path)?);
                    self.write_scope_report(&mut out, Scope::Tile { y, x })?;
                    out.flush()?;
                }
            }
        }

        Ok(())
    }

    fn observed_group_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = (0..NUM_TAGS as u32)
            .flat_map(|tag| self.rollup.group_ids(tag))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn write_mesh_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.write_tag_section(out, Scope::Mesh)?;
        self.write_group_timing_section(out)?;
        self.write_miss_section(out, Scope::Mesh)?;
        self.write_stall_section(out, Scope::Mesh)?;
        self.write_instr_section(out, Scope::Mesh)?;
        self.write_tile_timing_section(out)?;
        Ok(())
    }

    fn write_scope_report<W: Write>(&self, out: &mut W, scope: Scope) -> io::Result<()> {
        self.write_tag_section(out, scope)?;
        self.write_scope_timing_section(out, scope)?;
        self.write_miss_section(out, scope)?;
        self.write_stall_section(out, scope)?;
        self.write_instr_section(out, scope)?;
        Ok(())
    }

    fn write_lbreak<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", "=".repeat(LBREAK_WIDTH))
    }

    // The kernel tag's separator is labeled by name rather than number.
    fn write_tag_separator<W: Write>(&self, out: &mut W, tag: u32) -> io::Result<()> {
        let label = if tag == KERNEL_TAG {
            "kernel".to_string()
        } else {
            format!("Tag {:<2}", tag)
        };
        writeln!(out, "{}  {}  {}", "-".repeat(75), label, "-".repeat(75))
    }

    /// Per-tag totals: instruction and stall sums, elapsed cycles, IPC, and
    /// each tag's share of the kernel window.
    fn write_tag_section<W: Write>(&self, out: &mut W, scope: Scope) -> io::Result<()> {
        writeln!(out, "Tag Stats")?;
        write!(out, "{}", fmt_name("tag"))?;
        for head in ["instr", "stall", "cycle sum", "IPC", "cycle share(%)"] {
            write!(out, "{}", fmt_head(head))?;
        }
        writeln!(out)?;
        self.write_lbreak(out)?;

        let kernel_ctr = scope.value(self.rollup, KERNEL_TAG, GLOBAL_CTR);
        for tag in 0..NUM_TAGS as u32 {
            if !scope.active(self.rollup, tag) {
                continue;
            }
            let instr = scope.value(self.rollup, tag, INSTR_TOTAL);
            let stall = scope.value(self.rollup, tag, STALL_TOTAL);
            let ctr = scope.value(self.rollup, tag, GLOBAL_CTR);
            writeln!(
                out,
                "{}{}{}{}{}{}",
                fmt_name(&tag.to_string()),
                fmt_int(instr),
                fmt_int(stall),
                fmt_int(ctr),
                fmt_float(ratio(instr, ctr)),
                fmt_pct(pct(ctr, kernel_ctr)),
            )?;
        }
        self.write_lbreak(out)?;
        writeln!(out)
    }

    /// Mesh report only: execution timing per tile group, under each tag.
    fn write_group_timing_section<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Tile Group Timing Stats")?;
        write!(out, "{}", fmt_name("tile group"))?;
        for head in [
            "instr sum",
            "cycle sum",
            "IPC",
            "TG&tag / tag(%)",
            "TG&tag / TG&kernel(%)",
        ] {
            write!(out, "{}", fmt_head(head))?;
        }
        writeln!(out)?;
        self.write_lbreak(out)?;

        for tag in 0..NUM_TAGS as u32 {
            if !self.rollup.tag_active(tag) {
                continue;
            }
            self.write_tag_separator(out, tag)?;
            let mesh_ctr = self.rollup.mesh_value(tag, GLOBAL_CTR);
            for id in self.rollup.group_ids(tag).collect::<Vec<_>>() {
                let instr = self.rollup.group_value(tag, id, INSTR_TOTAL);
                let ctr = self.rollup.group_value(tag, id, GLOBAL_CTR);
                let kernel_ctr = self.rollup.group_value(KERNEL_TAG, id, GLOBAL_CTR);
                writeln!(
                    out,
                    "{}{}{}{}{}{}",
                    fmt_name(&id.to_string()),
                    fmt_int(instr),
                    fmt_int(ctr),
                    fmt_float(ratio(instr, ctr)),
                    fmt_pct(pct(ctr, mesh_ctr)),
                    fmt_pct(pct(ctr, kernel_ctr)),
                )?;
            }
            let instr = self.rollup.mesh_value(tag, INSTR_TOTAL);
            let kernel_ctr = self.rollup.mesh_value(KERNEL_TAG, GLOBAL_CTR);
            writeln!(
                out,
                "{}{}{}{}{}{}",
                fmt_name("total"),
                fmt_int(instr),
                fmt_int(mesh_ctr),
                fmt_float(ratio(instr, mesh_ctr)),
                fmt_pct(pct(mesh_ctr, mesh_ctr)),
                fmt_pct(pct(mesh_ctr, kernel_ctr)),
            )?;
        }
        self.write_lbreak(out)?;
        writeln!(out)
    }

    /// Mesh report only: execution timing per tile, under each tag.
    fn write_tile_timing_section<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Tile Timing Stats")?;
        write!(out, "{}", fmt_name("tile"))?;
        for head in [
            "instr",
            "cycle",
            "IPC",
            "tile&tag / tag(%)",
            "tile&tag / tile&kernel(%)",
        ] {
            write!(out, "{}", fmt_head(head))?;
        }
        writeln!(out)?;
        self.write_lbreak(out)?;

        let grid = *self.rollup.grid();
        for tag in 0..NUM_TAGS as u32 {
            if !self.rollup.tag_active(tag) {
                continue;
            }
            self.write_tag_separator(out, tag)?;
            let mesh_ctr = self.rollup.mesh_value(tag, GLOBAL_CTR);
            for y in 0..grid.dim_y {
                for x in 0..grid.dim_x {
                    let instr = self.rollup.tile_value(tag, y, x, INSTR_TOTAL);
                    let ctr = self.rollup.tile_value(tag, y, x, GLOBAL_CTR);
                    let kernel_ctr = self.rollup.tile_value(KERNEL_TAG, y, x, GLOBAL_CTR);
                    writeln!(
                        out,
                        "{}{}{}{}{}{}",
                        fmt_cord(y, x),
                        fmt_int(instr),
                        fmt_int(ctr),
                        fmt_float(ratio(instr, ctr)),
                        fmt_pct(pct(ctr, mesh_ctr)),
                        fmt_pct(pct(ctr, kernel_ctr)),
                    )?;
                }
            }
        }
        self.write_lbreak(out)?;
        writeln!(out)
    }

    /// Per-entity files only: the entity's own timing under each tag, with
    /// its share of the mesh-wide tag window and of its own kernel window.
    fn write_scope_timing_section<W: Write>(&self, out: &mut W, scope: Scope) -> io::Result<()> {
        let (label, heads) = match scope {
            // The mesh report carries the per-tile and per-group timing
            // sections instead.
            Scope::Mesh => return Ok(()),
            Scope::Group(_) => (
                "tile group",
                [
                    "instr sum",
                    "cycle sum",
                    "IPC",
                    "TG&tag / tag(%)",
                    "TG&tag / TG&kernel(%)",
                ],
            ),
            Scope::Tile { .. } => (
                "tile",
                [
                    "instr",
                    "cycle",
                    "IPC",
                    "tile&tag / tag(%)",
                    "tile&tag / tile&kernel(%)",
                ],
            ),
        };

        writeln!(out, "Timing Stats")?;
        write!(out, "{}", fmt_name(label))?;
        for head in heads {
            write!(out, "{}", fmt_head(head))?;
        }
        writeln!(out)?;
        self.write_lbreak(out)?;

        let entity = match scope {
            Scope::Mesh => unreachable!(),
            Scope::Group(id) => fmt_name(&id.to_string()),
            Scope::Tile { y, x } => fmt_cord(y, x),
        };
        let kernel_ctr = scope.value(self.rollup, KERNEL_TAG, GLOBAL_CTR);
        for tag in 0..NUM_TAGS as u32 {
            if !scope.active(self.rollup, tag) {
                continue;
            }
            self.write_tag_separator(out, tag)?;
            let instr = scope.value(self.rollup, tag, INSTR_TOTAL);
            let ctr = scope.value(self.rollup, tag, GLOBAL_CTR);
            let mesh_ctr = self.rollup.mesh_value(tag, GLOBAL_CTR);
            writeln!(
                out,
                "{}{}{}{}{}{}",
                entity,
                fmt_int(instr),
                fmt_int(ctr),
                fmt_float(ratio(instr, ctr)),
                fmt_pct(pct(ctr, mesh_ctr)),
                fmt_pct(pct(ctr, kernel_ctr)),
            )?;
        }
        self.write_lbreak(out)?;
        writeln!(out)
    }

    /// Cache-miss counts paired with the operation count they miss against.
    /// `miss_icache` misses against every fetched instruction; any other
    /// `miss_X` pairs with `instr_X`.
    fn write_miss_section<W: Write>(&self, out: &mut W, scope: Scope) -> io::Result<()> {
        writeln!(out, "Miss Stats")?;
        write!(out, "{}", fmt_name("unit"))?;
        for head in ["miss", "total", "hit rate"] {
            write!(out, "{}", fmt_head(head))?;
        }
        writeln!(out)?;
        self.write_lbreak(out)?;

        let schema = self.rollup.schema();
        for tag in 0..NUM_TAGS as u32 {
            if !scope.active(self.rollup, tag) {
                continue;
            }
            self.write_tag_separator(out, tag)?;
            for &miss_op in schema.misses() {
                let miss_name = schema.name(miss_op);
                let total = if miss_name == "miss_icache" {
                    scope.value(self.rollup, tag, INSTR_TOTAL)
                } else {
                    let paired = miss_name.replacen("miss_", "instr_", 1);
                    scope.value(self.rollup, tag, &paired)
                };
                let misses = scope.value(self.rollup, tag, miss_name);
                let hit_rate = if total == 0 {
                    1.0
                } else {
                    1.0 - ratio(misses, total)
                };
                writeln!(
                    out,
                    "{}{}{}{}",
                    fmt_name(miss_name),
                    fmt_int(misses),
                    fmt_int(total),
                    fmt_float(hit_rate),
                )?;
            }
        }
        self.write_lbreak(out)?;
        writeln!(out)
    }

    fn write_stall_section<W: Write>(&self, out: &mut W, scope: Scope) -> io::Result<()> {
        writeln!(out, "Stall Stats")?;
        write!(out, "{}", fmt_name("stall"))?;
        for head in ["cycles", "tag stall mix(%)", "cycle share(%)"] {
            write!(out, "{}", fmt_head(head))?;
        }
        writeln!(out)?;
        self.write_lbreak(out)?;

        let schema = self.rollup.schema();
        for tag in 0..NUM_TAGS as u32 {
            if !scope.active(self.rollup, tag) {
                continue;
            }
            self.write_tag_separator(out, tag)?;
            let stall_total = scope.value(self.rollup, tag, STALL_TOTAL);
            let ctr = scope.value(self.rollup, tag, GLOBAL_CTR);
            for &stall_op in schema.stalls() {
                let name = schema.name(stall_op);
                let cycles = scope.value(self.rollup, tag, name);
                writeln!(
                    out,
                    "{}{}{}{}",
                    fmt_name(name),
                    fmt_int(cycles),
                    fmt_pct(pct(cycles, stall_total)),
                    fmt_pct(pct(cycles, ctr)),
                )?;
            }
        }
        self.write_lbreak(out)?;
        writeln!(out)
    }

    fn write_instr_section<W: Write>(&self, out: &mut W, scope: Scope) -> io::Result<()> {
        writeln!(out, "Instruction Stats")?;
        write!(out, "{}", fmt_name("instruction"))?;
        for head in ["count", "tag instr mix(%)"] {
            write!(out, "{}", fmt_head(head))?;
        }
        writeln!(out)?;
        self.write_lbreak(out)?;

        let schema = self.rollup.schema();
        for tag in 0..NUM_TAGS as u32 {
            if !scope.active(self.rollup, tag) {
                continue;
            }
            self.write_tag_separator(out, tag)?;
            let instr_total = scope.value(self.rollup, tag, INSTR_TOTAL);
            for &instr_op in schema.instrs() {
                let name = schema.name(instr_op);
                let count = scope.value(self.rollup, tag, name);
                writeln!(
                    out,
                    "{}{}{}",
                    fmt_name(name),
                    fmt_int(count),
                    fmt_pct(pct(count, instr_total)),
                )?;
            }
        }
        self.write_lbreak(out)?;
        writeln!(out)
    }

    fn write_summary_json(&self, out_dir: &Path) -> io::Result<()> {
        let summary = RunSummary::from_rollup(self.rollup);
        let path = out_dir.join("summary.json");
        let payload = serde_json::to_string_pretty(&summary)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        fs::write(&path, payload)?;
        info!("wrote {}", path.display());
        Ok(())
    }
}

/// Machine-readable counterpart of the mesh report.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub dim_x: usize,
    pub dim_y: usize,
    pub active_tags: Vec<u32>,
    pub tags: Vec<TagSummary>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TagSummary {
    pub tag: u32,
    pub cycles: i64,
    pub instr_total: i64,
    pub stall_total: i64,
    pub miss_total: i64,
    pub num_groups: usize,
    pub group_ids: Vec<u32>,
}

impl RunSummary {
    pub fn from_rollup(rollup: &StatsRollup) -> Self {
        let active_tags = rollup.active_tags();
        let tags = active_tags
            .iter()
            .map(|&tag| TagSummary {
                tag,
                cycles: rollup.mesh_value(tag, GLOBAL_CTR),
                instr_total: rollup.mesh_value(tag, INSTR_TOTAL),
                stall_total: rollup.mesh_value(tag, STALL_TOTAL),
                miss_total: rollup.mesh_value(tag, MISS_TOTAL),
                num_groups: rollup.num_groups(tag),
                group_ids: rollup.group_ids(tag).collect(),
            })
            .collect();
        Self {
            dim_x: rollup.grid().dim_x,
            dim_y: rollup.grid().dim_y,
            active_tags,
            tags,
            warnings: rollup.warnings().iter().map(|w| w.to_string()).collect(),
        }
    }
}
