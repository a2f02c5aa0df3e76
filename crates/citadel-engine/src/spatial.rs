//! Uniform ground-plane grid for broad-phase proximity queries.
//!
//! The [`SpatialGrid`] splits the X/Z extent of the world into a fixed number
//! of cells. Each instance is listed in every cell its bound overlaps, and the
//! covered cell range is remembered so a move can take the instance out of
//! exactly the cells it was put in.
//!
//! Queries are conservative: every instance whose bound overlaps the query box
//! is returned, plus possibly some neighbours that merely share a cell.
//! Positions outside the world saturate to the border cells.

use std::collections::HashMap;

use citadel_ecs::entity::InstanceHandle;
use citadel_ecs::glam::{UVec2, Vec3};
use citadel_ecs::transform::Aabb;

// ---------------------------------------------------------------------------
// CellRange
// ---------------------------------------------------------------------------

/// Inclusive range of cell coordinates on X and Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub min: UVec2,
    pub max: UVec2,
}

impl CellRange {
    pub fn cell_count(&self) -> u32 {
        (self.max.x - self.min.x + 1) * (self.max.y - self.min.y + 1)
    }
}

// ---------------------------------------------------------------------------
// SpatialGrid
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Record {
    handle: InstanceHandle,
    translation: Vec3,
    bound: Aabb,
    range: CellRange,
    /// Token of the last query that collected this record.
    stamp: u64,
}

/// Fixed-size bucket grid over the world's X/Z bounds.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cells: UVec2,
    world: Aabb,
    /// Row-major by Z, each bucket lists record slots.
    buckets: Vec<Vec<u32>>,
    records: Vec<Option<Record>>,
    slots: HashMap<InstanceHandle, u32>,
    free_slots: Vec<u32>,
    query_token: u64,
}

impl SpatialGrid {
    /// Create a grid of `cells.x * cells.y` cells spanning `world`'s X/Z extent.
    ///
    /// Zero cell counts are raised to one.
    pub fn new(cells: UVec2, world: Aabb) -> Self {
        let cells = cells.max(UVec2::ONE);
        Self {
            cells,
            world,
            buckets: vec![Vec::new(); (cells.x * cells.y) as usize],
            records: Vec::new(),
            slots: HashMap::new(),
            free_slots: Vec::new(),
            query_token: 0,
        }
    }

    pub fn cells(&self) -> UVec2 {
        self.cells
    }

    pub fn world_bounds(&self) -> Aabb {
        self.world
    }

    /// Cell containing `point`, clamped into the grid.
    pub fn cell_of(&self, point: Vec3) -> UVec2 {
        let span = self.world.max - self.world.min;
        let normalize = |value: f32, min: f32, extent: f32| {
            if extent > 0.0 {
                ((value - min) / extent).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        let nx = normalize(point.x, self.world.min.x, span.x);
        let nz = normalize(point.z, self.world.min.z, span.z);
        // NaN saturates to zero through the float-to-int cast.
        let cx = ((nx * self.cells.x as f32) as u32).min(self.cells.x - 1);
        let cz = ((nz * self.cells.y as f32) as u32).min(self.cells.y - 1);
        UVec2::new(cx, cz)
    }

    /// Cells covered by `bound` placed at `translation`.
    pub fn range_for(&self, translation: Vec3, bound: &Aabb) -> CellRange {
        let a = self.cell_of(translation + bound.min);
        let b = self.cell_of(translation + bound.max);
        CellRange {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Insert `handle` into every cell its bound covers.
    ///
    /// A handle that is already present is moved instead.
    pub fn add_instance(&mut self, handle: InstanceHandle, translation: Vec3, bound: Aabb) {
        if self.slots.contains_key(&handle) {
            self.update_instance(handle, translation, Some(bound));
            return;
        }
        let range = self.range_for(translation, &bound);
        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                self.records.push(None);
                (self.records.len() - 1) as u32
            }
        };
        self.records[slot as usize] = Some(Record {
            handle,
            translation,
            bound,
            range,
            stamp: 0,
        });
        self.slots.insert(handle, slot);
        self.insert_into_cells(slot, range);
    }

    /// Move `handle`, optionally with a new bound.
    ///
    /// The instance leaves its recorded cells before it is inserted into the
    /// new ones. Unknown handles are ignored.
    pub fn update_instance(&mut self, handle: InstanceHandle, translation: Vec3, bound: Option<Aabb>) {
        let Some(&slot) = self.slots.get(&handle) else {
            return;
        };
        let Some(record) = self.records[slot as usize].as_mut() else {
            return;
        };
        record.translation = translation;
        if let Some(bound) = bound {
            record.bound = bound;
        }
        let old_range = record.range;
        let record_bound = record.bound;
        let new_range = self.range_for(translation, &record_bound);
        if new_range == old_range {
            return;
        }
        self.remove_from_cells(slot, old_range);
        if let Some(record) = self.records[slot as usize].as_mut() {
            record.range = new_range;
        }
        self.insert_into_cells(slot, new_range);
    }

    /// Remove `handle` from the grid. No-op when unknown.
    pub fn remove_instance(&mut self, handle: InstanceHandle) -> bool {
        let Some(slot) = self.slots.remove(&handle) else {
            return false;
        };
        if let Some(record) = self.records[slot as usize].take() {
            self.remove_from_cells(slot, record.range);
        }
        self.free_slots.push(slot);
        true
    }

    /// Unique handles listed in any cell the query box touches.
    ///
    /// The query box is `[translation + min_offset, translation + max_offset]`.
    pub fn find_near(&mut self, translation: Vec3, min_offset: Vec3, max_offset: Vec3) -> Vec<InstanceHandle> {
        let mut out = Vec::new();
        self.find_near_into(translation, min_offset, max_offset, &mut out);
        out
    }

    /// [`find_near`](Self::find_near) into a caller-owned buffer, which is
    /// cleared first.
    pub fn find_near_into(
        &mut self,
        translation: Vec3,
        min_offset: Vec3,
        max_offset: Vec3,
        out: &mut Vec<InstanceHandle>,
    ) {
        out.clear();
        self.query_token += 1;
        let token = self.query_token;
        let range = self.range_for(translation, &Aabb::new(min_offset, max_offset));
        for z in range.min.y..=range.max.y {
            for x in range.min.x..=range.max.x {
                let bucket = &self.buckets[self.bucket_index(x, z)];
                for &slot in bucket {
                    if let Some(record) = self.records[slot as usize].as_mut() {
                        if record.stamp != token {
                            record.stamp = token;
                            out.push(record.handle);
                        }
                    }
                }
            }
        }
    }

    /// Handles listed in one cell, in insertion order.
    pub fn cell_contents(&self, cell: UVec2) -> Vec<InstanceHandle> {
        if cell.x >= self.cells.x || cell.y >= self.cells.y {
            return Vec::new();
        }
        self.buckets[self.bucket_index(cell.x, cell.y)]
            .iter()
            .filter_map(|&slot| self.records[slot as usize].as_ref().map(|r| r.handle))
            .collect()
    }

    /// Cell range recorded for `handle`.
    pub fn cell_range(&self, handle: InstanceHandle) -> Option<CellRange> {
        let slot = *self.slots.get(&handle)?;
        self.records[slot as usize].as_ref().map(|r| r.range)
    }

    pub fn translation_of(&self, handle: InstanceHandle) -> Option<Vec3> {
        let slot = *self.slots.get(&handle)?;
        self.records[slot as usize].as_ref().map(|r| r.translation)
    }

    pub fn contains(&self, handle: InstanceHandle) -> bool {
        self.slots.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total bucket entries; an instance spanning several cells counts once
    /// per cell.
    pub fn entry_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(Vec::clear);
        self.records.clear();
        self.slots.clear();
        self.free_slots.clear();
    }

    #[inline]
    fn bucket_index(&self, x: u32, z: u32) -> usize {
        (z * self.cells.x + x) as usize
    }

    fn insert_into_cells(&mut self, slot: u32, range: CellRange) {
        for z in range.min.y..=range.max.y {
            for x in range.min.x..=range.max.x {
                let index = self.bucket_index(x, z);
                self.buckets[index].push(slot);
            }
        }
    }

    fn remove_from_cells(&mut self, slot: u32, range: CellRange) {
        for z in range.min.y..=range.max.y {
            for x in range.min.x..=range.max.x {
                let index = self.bucket_index(x, z);
                let bucket = &mut self.buckets[index];
                if let Some(pos) = bucket.iter().position(|&s| s == slot) {
                    bucket.swap_remove(pos);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
