use collapse_core::{BlockPos, FillShape, RegionCoord, REGION_EDGE};

/// Axis-aligned box of cells visited by the fill and drain passes.
///
/// Cells are enumerated top layer first, then row by row along z, then
/// along x, so a linear index identifies a resumable position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Volume {
    min_x: i32,
    min_y: i32,
    min_z: i32,
    size_x: i32,
    size_y: i32,
    size_z: i32,
    full: bool,
}

impl Volume {
    /// The full footprint of the region over the height range.
    pub(crate) fn region(coord: RegionCoord, (min_y, max_y): (i32, i32)) -> Self {
        Self {
            min_x: coord.min_block_x(),
            min_y,
            min_z: coord.min_block_z(),
            size_x: REGION_EDGE,
            size_y: max_y.saturating_sub(min_y).max(0),
            size_z: REGION_EDGE,
            full: true,
        }
    }

    /// The slab of the region facing `anchor`, `thickness` cells deep.
    ///
    /// A region containing the anchor column keeps its full volume.
    pub(crate) fn facing(
        coord: RegionCoord,
        height: (i32, i32),
        anchor: BlockPos,
        thickness: u32,
    ) -> Self {
        let full = Self::region(coord, height);
        if coord.contains_column(anchor.x, anchor.z) {
            return full;
        }

        let depth = i32::try_from(thickness).unwrap_or(REGION_EDGE).clamp(1, REGION_EDGE);
        let max_x = full.min_x + (REGION_EDGE - 1);
        let max_z = full.min_z + (REGION_EDGE - 1);
        let dx = i64::from(anchor.x) - i64::from(anchor.x.clamp(full.min_x, max_x));
        let dz = i64::from(anchor.z) - i64::from(anchor.z.clamp(full.min_z, max_z));

        let mut slab = full;
        slab.full = false;
        if dx.abs() >= dz.abs() {
            slab.size_x = depth;
            if dx > 0 {
                slab.min_x = max_x - (depth - 1);
            }
        } else {
            slab.size_z = depth;
            if dz > 0 {
                slab.min_z = max_z - (depth - 1);
            }
        }
        slab
    }

    /// Indicates whether the volume spans the whole region.
    pub(crate) const fn is_full(&self) -> bool {
        self.full
    }

    /// Vertical extent as a half-open range.
    pub(crate) const fn height_range(&self) -> (i32, i32) {
        (self.min_y, self.min_y + self.size_y)
    }

    /// Number of cells in the volume.
    pub(crate) fn len(&self) -> u64 {
        let cells = i64::from(self.size_x) * i64::from(self.size_y) * i64::from(self.size_z);
        u64::try_from(cells).unwrap_or(0)
    }

    /// Cell at the linear index, if the index lies inside the volume.
    pub(crate) fn position(&self, index: u64) -> Option<BlockPos> {
        if index >= self.len() {
            return None;
        }
        let layer = u64::try_from(i64::from(self.size_x) * i64::from(self.size_z)).ok()?;
        let level = i32::try_from(index / layer).ok()?;
        let rest = index % layer;
        let size_x = u64::try_from(self.size_x).ok()?;
        let row = i32::try_from(rest / size_x).ok()?;
        let column = i32::try_from(rest % size_x).ok()?;
        Some(BlockPos::new(
            self.min_x + column,
            self.min_y + self.size_y - 1 - level,
            self.min_z + row,
        ))
    }

    /// Distance in cells from the position to the nearest face of the volume.
    fn face_distance(&self, pos: BlockPos) -> i32 {
        let axes = [
            (pos.x - self.min_x, self.min_x - pos.x + (self.size_x - 1)),
            (pos.y - self.min_y, self.min_y - pos.y + (self.size_y - 1)),
            (pos.z - self.min_z, self.min_z - pos.z + (self.size_z - 1)),
        ];
        axes.iter()
            .map(|(low, high)| (*low).min(*high))
            .min()
            .unwrap_or(0)
    }
}

/// Membership test of a fill shape over a volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ShapeFilter {
    shape: FillShape,
    thickness: i32,
    reference_y: i32,
}

impl ShapeFilter {
    /// Filter for `shape` with the row band centered on `center_y`.
    pub(crate) fn new(shape: FillShape, thickness: u32, center_y: i32, volume: &Volume) -> Self {
        let (min_y, max_y) = volume.height_range();
        let reference_y = if max_y > min_y {
            center_y.clamp(min_y, max_y - 1)
        } else {
            min_y
        };
        Self {
            shape,
            thickness: i32::try_from(thickness).unwrap_or(i32::MAX).max(1),
            reference_y,
        }
    }

    /// Reports whether every cell of the volume is a member.
    pub(crate) const fn selects_every_cell(&self) -> bool {
        matches!(self.shape, FillShape::Matrix)
    }

    pub(crate) fn contains(&self, volume: &Volume, pos: BlockPos) -> bool {
        match self.shape {
            FillShape::Matrix => true,
            FillShape::Outline => volume.face_distance(pos) < self.thickness,
            FillShape::Row => (pos.y - self.reference_y).abs() < self.thickness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(volume: &Volume, filter: &ShapeFilter) -> usize {
        (0..volume.len())
            .filter_map(|index| volume.position(index))
            .filter(|pos| filter.contains(volume, *pos))
            .count()
    }

    #[test]
    fn last_addressable_region_stays_in_range() {
        let coord = RegionCoord::new(collapse_core::MAX_REGION, 0);
        let volume = Volume::region(coord, (0, 4));
        let shell = ShapeFilter::new(FillShape::Outline, 1, 0, &volume);
        assert_eq!(count(&volume, &shell), 16 * 16 * 4 - 14 * 14 * 2);
        assert_eq!(volume.position(15), Some(BlockPos::new(i32::MAX, 3, 0)));

        let west = Volume::facing(coord, (0, 4), BlockPos::new(i32::MIN, 0, 3), 2);
        assert_eq!(west.position(0), Some(BlockPos::new(i32::MAX - 15, 3, 0)));
        let east_edge = Volume::facing(
            RegionCoord::new(collapse_core::MAX_REGION - 1, 0),
            (0, 4),
            BlockPos::new(i32::MAX, 0, 3),
            2,
        );
        assert_eq!(east_edge.position(0), Some(BlockPos::new(i32::MAX - 17, 3, 0)));
    }

    #[test]
    fn positions_enumerate_top_down() {
        let volume = Volume::region(RegionCoord::new(-1, 2), (0, 4));
        assert_eq!(volume.len(), 1_024);
        assert_eq!(volume.position(0), Some(BlockPos::new(-16, 3, 32)));
        assert_eq!(volume.position(1), Some(BlockPos::new(-15, 3, 32)));
        assert_eq!(volume.position(16), Some(BlockPos::new(-16, 3, 33)));
        assert_eq!(volume.position(256), Some(BlockPos::new(-16, 2, 32)));
        assert_eq!(volume.position(1_023), Some(BlockPos::new(-1, 0, 47)));
        assert_eq!(volume.position(1_024), None);
    }

    #[test]
    fn outline_is_a_shell_of_the_given_thickness() {
        let volume = Volume::region(RegionCoord::new(0, 0), (0, 16));
        let shell = ShapeFilter::new(FillShape::Outline, 1, 8, &volume);
        assert_eq!(count(&volume, &shell), 16 * 16 * 16 - 14 * 14 * 14);
        let thick = ShapeFilter::new(FillShape::Outline, 2, 8, &volume);
        assert_eq!(count(&volume, &thick), 16 * 16 * 16 - 12 * 12 * 12);
    }

    #[test]
    fn row_is_a_band_around_the_clamped_center() {
        let volume = Volume::region(RegionCoord::new(0, 0), (0, 8));
        let band = ShapeFilter::new(FillShape::Row, 2, 100, &volume);
        assert_eq!(count(&volume, &band), 2 * 256);
        assert!(band.contains(&volume, BlockPos::new(0, 7, 0)));
        assert!(band.contains(&volume, BlockPos::new(0, 6, 0)));
        assert!(!band.contains(&volume, BlockPos::new(0, 5, 0)));
    }

    #[test]
    fn slab_faces_the_anchor() {
        let coord = RegionCoord::new(0, 0);
        let east = Volume::facing(coord, (0, 4), BlockPos::new(100, 0, 3), 2);
        assert!(!east.is_full());
        assert_eq!(east.len(), 2 * 16 * 4);
        assert_eq!(east.position(0), Some(BlockPos::new(14, 3, 0)));

        let north = Volume::facing(coord, (0, 4), BlockPos::new(4, 0, -40), 1);
        assert_eq!(north.len(), 16 * 4);
        assert_eq!(north.position(0), Some(BlockPos::new(0, 3, 0)));
        assert_eq!(north.position(15), Some(BlockPos::new(15, 3, 0)));

        let inside = Volume::facing(coord, (0, 4), BlockPos::new(5, 0, 5), 1);
        assert!(inside.is_full());
    }
}
