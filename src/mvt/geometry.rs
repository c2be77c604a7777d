//! MVT geometry command-stream interpretation.
//!
//! Geometry arrives as the MVT command encoding: command integers
//! (`id = lowest 3 bits`, `count = upper bits`) interleaved with
//! zigzag-encoded coordinate deltas. MoveTo starts a part, LineTo extends
//! it, ClosePath closes a polygon ring. Truncated streams are interpreted
//! as far as they go.

use super::GeomType;

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

/// An integer vertex in the tile's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeomPoint {
    pub x: i32,
    pub y: i32,
}

impl GeomPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[inline]
fn unzigzag(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

/// Decode a command stream into rings/parts of integer vertices.
///
/// Point features emit one part per MoveTo run; line and polygon features
/// emit one part per MoveTo. ClosePath appends the opening vertex when the
/// ring is not already closed.
pub(super) fn decode_commands(commands: &[u32], geom_type: GeomType) -> Vec<Vec<GeomPoint>> {
    let mut parts: Vec<Vec<GeomPoint>> = Vec::new();
    let mut current: Vec<GeomPoint> = Vec::new();
    let mut cursor = GeomPoint::new(0, 0);
    let mut i = 0;

    while i < commands.len() {
        let word = commands[i];
        let cmd = word & 0x7;
        let count = (word >> 3) as usize;
        i += 1;

        match cmd {
            CMD_MOVE_TO => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
                for _ in 0..count {
                    if i + 1 >= commands.len() {
                        break;
                    }
                    cursor.x += unzigzag(commands[i]);
                    cursor.y += unzigzag(commands[i + 1]);
                    i += 2;
                    current.push(cursor);
                    // Each MoveTo vertex of a point feature is its own part.
                    if geom_type == GeomType::Point {
                        parts.push(std::mem::take(&mut current));
                    }
                }
            }
            CMD_LINE_TO => {
                for _ in 0..count {
                    if i + 1 >= commands.len() {
                        break;
                    }
                    cursor.x += unzigzag(commands[i]);
                    cursor.y += unzigzag(commands[i + 1]);
                    i += 2;
                    if !current.is_empty() {
                        current.push(cursor);
                    }
                }
            }
            CMD_CLOSE_PATH => {
                if let (Some(&first), true) = (current.first(), current.len() >= 2) {
                    if current.last() != Some(&first) {
                        current.push(first);
                    }
                }
            }
            _ => {
                // Unknown command: skip its parameter pairs.
                i += 2 * count;
            }
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
