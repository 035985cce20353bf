//! Connected-component labeling of thresholded images.

use std::collections::HashMap;

use ndarray::{Array2, ArrayView2};

/// Axis-aligned extent of a labeled component, in i,j indices.
/// `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub beg: [usize; 2],
    pub end: [usize; 2],
}

impl BoundingBox {
    /// Size (rows, columns).
    pub fn ij_size(&self) -> [usize; 2] {
        [self.end[0] - self.beg[0], self.end[1] - self.beg[1]]
    }

    /// i,j position of the box center: the mean of start and end.
    pub fn ij_ctr(&self) -> [f64; 2] {
        [
            (self.beg[0] + self.end[0]) as f64 / 2.0,
            (self.beg[1] + self.end[1]) as f64 / 2.0,
        ]
    }
}

/// Labeled components: 0 is background, components are numbered from 1 in
/// raster order of their first pixel.
#[derive(Debug, Clone)]
pub struct Labels {
    pub labels: Array2<u32>,
    pub count: usize,
}

impl Labels {
    /// Bounding box of each component; entry `k` belongs to label `k + 1`.
    pub fn bounding_boxes(&self) -> Vec<BoundingBox> {
        let mut boxes: Vec<Option<BoundingBox>> = vec![None; self.count];
        for ((i, j), &label) in self.labels.indexed_iter() {
            if label == 0 {
                continue;
            }
            let entry = &mut boxes[label as usize - 1];
            match entry {
                None => {
                    *entry = Some(BoundingBox {
                        beg: [i, j],
                        end: [i + 1, j + 1],
                    })
                }
                Some(b) => {
                    b.beg[0] = b.beg[0].min(i);
                    b.beg[1] = b.beg[1].min(j);
                    b.end[0] = b.end[0].max(i + 1);
                    b.end[1] = b.end[1].max(j + 1);
                }
            }
        }
        boxes.into_iter().flatten().collect()
    }
}

/// Label 8-connected regions of true pixels using two-pass union-find.
pub fn label_8_connected(mask: &ArrayView2<bool>) -> Labels {
    let (h, w) = mask.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    let mut parent: Vec<u32> = Vec::new();
    let mut next_label = 1u32;

    // Find root with path compression
    fn find(parent: &mut [u32], mut x: u32) -> u32 {
        while parent[x as usize] != x {
            parent[x as usize] = parent[parent[x as usize] as usize];
            x = parent[x as usize];
        }
        x
    }

    fn union(parent: &mut [u32], a: u32, b: u32) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra != rb {
            // Merge higher into lower to keep labels stable
            if ra < rb {
                parent[rb as usize] = ra;
            } else {
                parent[ra as usize] = rb;
            }
        }
    }

    // Index 0 is background
    parent.push(0);

    // First pass: provisional labels from the already-visited neighbors
    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }
            let mut neighbors = [0u32; 4];
            let mut n_neighbors = 0;
            let mut push = |label: u32| {
                if label > 0 {
                    neighbors[n_neighbors] = label;
                    n_neighbors += 1;
                }
            };
            if col > 0 {
                push(labels[[row, col - 1]]);
            }
            if row > 0 {
                push(labels[[row - 1, col]]);
                if col > 0 {
                    push(labels[[row - 1, col - 1]]);
                }
                if col + 1 < w {
                    push(labels[[row - 1, col + 1]]);
                }
            }

            match neighbors[..n_neighbors].iter().min() {
                None => {
                    parent.push(next_label);
                    labels[[row, col]] = next_label;
                    next_label += 1;
                }
                Some(&min_label) => {
                    labels[[row, col]] = min_label;
                    for &nl in &neighbors[..n_neighbors] {
                        union(&mut parent, min_label, nl);
                    }
                }
            }
        }
    }

    // Second pass: flatten to sequential labels in raster order
    let mut root_map: HashMap<u32, u32> = HashMap::new();
    let mut count = 0u32;
    for label in labels.iter_mut() {
        if *label == 0 {
            continue;
        }
        let root = find(&mut parent, *label);
        *label = *root_map.entry(root).or_insert_with(|| {
            count += 1;
            count
        });
    }

    Labels {
        labels,
        count: count as usize,
    }
}
