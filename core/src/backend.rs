use thiserror::Error;

use crate::{BlockPos, Cell, RegionCoord, WorldBorder};

/// Transient failure to read, write, or materialize a region.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
#[error("region {coord} is unavailable")]
pub struct RegionUnavailable {
    /// Region that could not be accessed.
    pub coord: RegionCoord,
}

impl RegionUnavailable {
    /// Creates the error for the provided region.
    #[must_use]
    pub const fn new(coord: RegionCoord) -> Self {
        Self { coord }
    }
}

/// Successful outcome of a materialization request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Materialization {
    /// The region already satisfied the request; nothing was done.
    AlreadyReady,
    /// The backend generated or loaded the region to satisfy the request.
    Materialized,
}

/// Side-effect seam between the lifecycle and the persistent world.
///
/// Every call is synchronous and bounded; callers budget how many calls they
/// issue per tick. Implementations report transient failures through
/// [`RegionUnavailable`] and never panic on missing data.
pub trait RegionBackend {
    /// Forces the region to exist in the backing store.
    fn generate(&mut self, coord: RegionCoord) -> Result<Materialization, RegionUnavailable>;

    /// Brings the region into residency so it can be edited.
    fn load(&mut self, coord: RegionCoord) -> Result<Materialization, RegionUnavailable>;

    /// Places a keep-resident ticket on the region.
    fn pin(&mut self, coord: RegionCoord);

    /// Removes the keep-resident ticket from the region.
    fn unpin(&mut self, coord: RegionCoord);

    /// Reports whether the region is resident and editable right now.
    fn is_resident(&self, coord: RegionCoord) -> bool;

    /// Asks the backend to make the region resident.
    ///
    /// `Ok` means the request was accepted; residency may still arrive on a
    /// later tick.
    fn request_residency(&mut self, coord: RegionCoord) -> Result<(), RegionUnavailable>;

    /// Vertical extent of every region as a half-open `(min_y, max_y)` range.
    fn height_range(&self) -> (i32, i32);

    /// Reads a single cell.
    fn cell(&self, pos: BlockPos) -> Result<Cell, RegionUnavailable>;

    /// Replaces a single cell.
    fn set_cell(&mut self, pos: BlockPos, cell: Cell) -> Result<(), RegionUnavailable>;

    /// Reports whether [`RegionBackend::clear_fluids`] is available.
    fn supports_bulk_fluid_clear(&self) -> bool {
        false
    }

    /// Empties every fluid cell of the region between `min_y` and `max_y`.
    ///
    /// Returns the number of cells that changed.
    fn clear_fluids(
        &mut self,
        coord: RegionCoord,
        _min_y: i32,
        _max_y: i32,
    ) -> Result<u64, RegionUnavailable> {
        Err(RegionUnavailable::new(coord))
    }

    /// Discards edits to the region and regenerates its original content.
    fn regenerate(&mut self, coord: RegionCoord) -> Result<(), RegionUnavailable>;

    /// Boundary currently governing the world.
    fn world_border(&self) -> WorldBorder;

    /// Replaces the boundary governing the world.
    fn apply_border(&mut self, border: WorldBorder);
}
