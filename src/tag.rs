use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::error::StatError;

// Field layout of the packed tag word emitted by the print-stat instruction,
// most significant to least significant:
//
//   kind    -   core y   -   core x   -   tile group id   -      tag
//  <--2-->  -  <--6-->   -  <--6-->   -  <------14----->  -  <----4---->
//
// These widths are fixed constants of the trace protocol and must match the
// instrumentation library on the device side.
const TAG_INDEX: u32 = 0;
const TAG_WIDTH: u32 = 4;
const GROUP_INDEX: u32 = TAG_INDEX + TAG_WIDTH;
const GROUP_WIDTH: u32 = 14;
const X_INDEX: u32 = GROUP_INDEX + GROUP_WIDTH;
const X_WIDTH: u32 = 6;
const Y_INDEX: u32 = X_INDEX + X_WIDTH;
const Y_WIDTH: u32 = 6;
const KIND_INDEX: u32 = Y_INDEX + Y_WIDTH;
const KIND_WIDTH: u32 = 2;

/// Number of distinct small tags; the tag axis of every table is preallocated
/// to this size.
pub const NUM_TAGS: usize = 1 << TAG_WIDTH;

/// Upper bound on tile group ids. The group axis is sparse, so this is only a
/// domain limit, never an allocation size.
pub const MAX_GROUPS: usize = 1 << GROUP_WIDTH;

/// Tag reserved for the whole-kernel window; reports use it as the
/// denominator for cycle-share columns.
pub const KERNEL_TAG: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum EventKind {
    Stat = 0,
    Start = 1,
    End = 2,
}

/// A decoded print-stat tag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatTag {
    pub kind: EventKind,
    pub core_y: u32,
    pub core_x: u32,
    pub group_id: u32,
    pub tag: u32,
}

fn field(raw: u32, index: u32, width: u32) -> u32 {
    (raw >> index) & ((1u32 << width) - 1)
}

impl StatTag {
    pub fn decode(raw: u32) -> Result<Self, StatError> {
        let code = field(raw, KIND_INDEX, KIND_WIDTH);
        let kind = EventKind::from_u32(code).ok_or(StatError::InvalidTag { raw, kind: code })?;
        Ok(Self {
            kind,
            core_y: field(raw, Y_INDEX, Y_WIDTH),
            core_x: field(raw, X_INDEX, X_WIDTH),
            group_id: field(raw, GROUP_INDEX, GROUP_WIDTH),
            tag: field(raw, TAG_INDEX, TAG_WIDTH),
        })
    }

    pub fn is_start(&self) -> bool {
        self.kind == EventKind::Start
    }

    pub fn is_end(&self) -> bool {
        self.kind == EventKind::End
    }
}
