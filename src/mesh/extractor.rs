//! Per-chunk segment emission and chain stitching
//!
//! Segments are emitted and stitched in pixel-corner integer space so the
//! joins are exact; chains convert to metres only at the end.

use glam::Vec2;
use std::collections::HashMap;

use super::simplify::simplify_chain;
use super::Chain;
use crate::world::{GridFrame, CHUNK_SIZE};

/// A directed boundary segment between two pixel corners, solid on the
/// right.
#[derive(Clone, Copy)]
struct Segment {
    a: (i32, i32),
    b: (i32, i32),
}

/// Mesh one chunk: emit a segment for every solid side facing a non-solid
/// cell, stitch the segments into chains and simplify them.
pub(super) fn mesh_chunk(
    frame: &GridFrame,
    cx: usize,
    cy: usize,
    pixels_per_meter: f32,
    epsilon: f32,
) -> Vec<Chain> {
    let segments = emit_segments(frame, cx, cy);
    let chains = stitch_segments(&segments);

    let scale = 1.0 / pixels_per_meter;
    chains
        .into_iter()
        .map(|points| {
            let chain: Chain = points
                .into_iter()
                .map(|(px, py)| Vec2::new(px as f32 * scale, py as f32 * scale))
                .collect();
            simplify_chain(chain, epsilon)
        })
        .collect()
}

fn emit_segments(frame: &GridFrame, cx: usize, cy: usize) -> Vec<Segment> {
    let x_start = (cx * CHUNK_SIZE) as i32;
    let y_start = (cy * CHUNK_SIZE) as i32;
    let mut segments = Vec::new();

    for y in y_start..y_start + CHUNK_SIZE as i32 {
        for x in x_start..x_start + CHUNK_SIZE as i32 {
            if !frame.cell(x, y).is_meshed() {
                continue;
            }
            let (x0, x1, y0, y1) = (x, x + 1, y, y + 1);
            if !frame.cell(x, y - 1).is_meshed() {
                segments.push(Segment { a: (x1, y0), b: (x0, y0) });
            }
            if !frame.cell(x, y + 1).is_meshed() {
                segments.push(Segment { a: (x0, y1), b: (x1, y1) });
            }
            if !frame.cell(x - 1, y).is_meshed() {
                segments.push(Segment { a: (x0, y0), b: (x0, y1) });
            }
            if !frame.cell(x + 1, y).is_meshed() {
                segments.push(Segment { a: (x1, y1), b: (x1, y0) });
            }
        }
    }
    segments
}

/// Stitch directed segments into maximal chains.
///
/// Adjacency is keyed on the integer start corner. Chains that leave the
/// chunk stay open; boundaries fully inside the chunk close on themselves
/// (first point repeated at the end).
fn stitch_segments(segments: &[Segment]) -> Vec<Vec<(i32, i32)>> {
    let mut starts: HashMap<(i32, i32), Vec<usize>> = HashMap::new();
    let mut incoming: HashMap<(i32, i32), usize> = HashMap::new();
    for (i, seg) in segments.iter().enumerate() {
        starts.entry(seg.a).or_default().push(i);
        *incoming.entry(seg.b).or_default() += 1;
    }

    let mut used = vec![false; segments.len()];
    let mut chains = Vec::new();

    // open chains first, seeded at heads (no incoming segment), then any
    // remaining pure loops
    for pass in 0..2 {
        for seed in 0..segments.len() {
            if used[seed] {
                continue;
            }
            if pass == 0 && incoming.get(&segments[seed].a).copied().unwrap_or(0) > 0 {
                continue;
            }
            used[seed] = true;
            let mut chain = vec![segments[seed].a, segments[seed].b];
            let mut tip = segments[seed].b;
            while tip != chain[0] {
                let Some(next) = starts
                    .get(&tip)
                    .and_then(|cands| cands.iter().find(|&&i| !used[i]))
                    .copied()
                else {
                    break;
                };
                used[next] = true;
                tip = segments[next].b;
                chain.push(tip);
            }
            chains.push(chain);
        }
    }
    chains
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(ax: i32, ay: i32, bx: i32, by: i32) -> Segment {
        Segment {
            a: (ax, ay),
            b: (bx, by),
        }
    }

    #[test]
    fn test_stitch_single_loop() {
        // a unit square loop, emitted out of order
        let segments = [
            seg(1, 0, 0, 0),
            seg(0, 1, 1, 1),
            seg(0, 0, 0, 1),
            seg(1, 1, 1, 0),
        ];
        let chains = stitch_segments(&segments);
        assert_eq!(chains.len(), 1);
        let chain = &chains[0];
        assert_eq!(chain.len(), 5);
        assert_eq!(chain.first(), chain.last());
    }

    #[test]
    fn test_stitch_open_chain_from_head() {
        // a straight open run: (0,0) -> (1,0) -> (2,0)
        let segments = [seg(1, 0, 2, 0), seg(0, 0, 1, 0)];
        let chains = stitch_segments(&segments);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0], vec![(0, 0), (1, 0), (2, 0)]);
    }

    #[test]
    fn test_stitch_two_disjoint_loops() {
        let segments = [
            seg(1, 0, 0, 0),
            seg(0, 0, 0, 1),
            seg(0, 1, 1, 1),
            seg(1, 1, 1, 0),
            seg(11, 0, 10, 0),
            seg(10, 0, 10, 1),
            seg(10, 1, 11, 1),
            seg(11, 1, 11, 0),
        ];
        let chains = stitch_segments(&segments);
        assert_eq!(chains.len(), 2);
        for chain in &chains {
            assert_eq!(chain.len(), 5);
            assert_eq!(chain.first(), chain.last());
        }
    }

    #[test]
    fn test_stitch_preserves_direction() {
        let segments = [seg(0, 0, 1, 0), seg(1, 0, 1, 1)];
        let chains = stitch_segments(&segments);
        assert_eq!(chains, vec![vec![(0, 0), (1, 0), (1, 1)]]);
    }
}
