#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! In-memory world backend used by hosts without a persistent store and by tests.
//!
//! The world lazily generates regions from deterministic terrain, tracks which
//! regions are resident and pinned, and lets callers inject regions that are
//! unavailable (every access fails) or stuck (residency requests are accepted
//! but never fulfilled).

use std::collections::{HashMap, HashSet};

use collapse_core::{
    BlockPos, Cell, Materialization, RegionBackend, RegionCoord, RegionUnavailable, WorldBorder,
    REGION_EDGE,
};
use log::{debug, trace};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Content id of plain stone.
pub const STONE: u16 = 1;
/// Content id of the surface layer.
pub const GRASS: u16 = 2;
/// Content id of the indestructible floor.
pub const BEDROCK: u16 = 7;
/// Content id of water.
pub const WATER: u16 = 8;

const DEFAULT_SEED: u64 = 0x42f0_e1eb_d4a5_3c21;
const DEFAULT_BORDER_DIAMETER: f64 = 59_999_968.0;
const REGION_SALT: u64 = 0x9e37_79b9_7f4a_7c15;
const EDGE: usize = REGION_EDGE as usize;

/// Terrain recipe used when a region is first generated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Terrain {
    /// Every cell starts empty.
    Empty,
    /// Every column is filled with `block` below `height`.
    Flat {
        /// Exclusive top of the filled layer.
        height: i32,
        /// Content id placed in the filled layer.
        block: u16,
    },
    /// Rolling stone terrain with a grass crust, bedrock floor and water below sea level.
    Seeded {
        /// Seed mixed with each region coordinate.
        seed: u64,
        /// Average surface height.
        surface: i32,
        /// Columns below this height are flooded.
        sea_level: i32,
    },
}

/// Construction parameters for a [`World`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldSettings {
    /// Inclusive bottom of every region.
    pub min_y: i32,
    /// Exclusive top of every region.
    pub max_y: i32,
    /// Recipe for newly generated regions.
    pub terrain: Terrain,
    /// Boundary governing the world at creation.
    pub border: WorldBorder,
    /// Enables the native bulk fluid clear.
    pub bulk_fluid_clear: bool,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            min_y: 0,
            max_y: 64,
            terrain: Terrain::Seeded {
                seed: DEFAULT_SEED,
                surface: 40,
                sea_level: 44,
            },
            border: WorldBorder::new(0.0, 0.0, DEFAULT_BORDER_DIAMETER),
            bulk_fluid_clear: true,
        }
    }
}

impl WorldSettings {
    /// Settings with a deterministic seeded terrain.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            terrain: Terrain::Seeded {
                seed,
                surface: 40,
                sea_level: 44,
            },
            ..Self::default()
        }
    }

    fn height(&self) -> usize {
        usize::try_from(self.max_y.saturating_sub(self.min_y)).unwrap_or(0)
    }
}

/// Authoritative in-memory world state.
#[derive(Clone, Debug)]
pub struct World {
    settings: WorldSettings,
    regions: HashMap<RegionCoord, Region>,
    resident: HashSet<RegionCoord>,
    pinned: HashSet<RegionCoord>,
    unavailable: HashSet<RegionCoord>,
    stuck: HashSet<RegionCoord>,
    border: WorldBorder,
    edits: u64,
    generations: u64,
}

impl World {
    /// Creates an empty world; regions are generated on first access.
    #[must_use]
    pub fn new(settings: WorldSettings) -> Self {
        Self {
            border: settings.border,
            settings,
            regions: HashMap::new(),
            resident: HashSet::new(),
            pinned: HashSet::new(),
            unavailable: HashSet::new(),
            stuck: HashSet::new(),
            edits: 0,
            generations: 0,
        }
    }

    /// Makes every access to the region fail until [`World::mark_available`].
    pub fn mark_unavailable(&mut self, coord: RegionCoord) {
        let _ = self.unavailable.insert(coord);
    }

    /// Reverses [`World::mark_unavailable`].
    pub fn mark_available(&mut self, coord: RegionCoord) {
        let _ = self.unavailable.remove(&coord);
    }

    /// Accepts residency requests for the region without ever fulfilling them.
    pub fn mark_stuck(&mut self, coord: RegionCoord) {
        let _ = self.stuck.insert(coord);
        let _ = self.resident.remove(&coord);
    }

    /// Reverses [`World::mark_stuck`].
    pub fn release_stuck(&mut self, coord: RegionCoord) {
        let _ = self.stuck.remove(&coord);
    }

    /// Writes a cell directly, generating and loading its region when needed.
    pub fn place(&mut self, pos: BlockPos, cell: Cell) {
        let coord = pos.region();
        let settings = self.settings;
        let region = self.region_or_generate(coord);
        if let Some(index) = cell_index(&settings, pos) {
            region.cells[index] = cell;
        }
        if !self.stuck.contains(&coord) {
            let _ = self.resident.insert(coord);
        }
    }

    fn region_or_generate(&mut self, coord: RegionCoord) -> &mut Region {
        let settings = self.settings;
        let generations = &mut self.generations;
        self.regions.entry(coord).or_insert_with(|| {
            *generations += 1;
            trace!("generated region {coord}");
            Region::generate(&settings, coord)
        })
    }

    fn accessible(&self, coord: RegionCoord) -> Result<(), RegionUnavailable> {
        if self.unavailable.contains(&coord) || !self.resident.contains(&coord) {
            return Err(RegionUnavailable::new(coord));
        }
        Ok(())
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldSettings::default())
    }
}

impl RegionBackend for World {
    fn generate(&mut self, coord: RegionCoord) -> Result<Materialization, RegionUnavailable> {
        if self.unavailable.contains(&coord) {
            return Err(RegionUnavailable::new(coord));
        }
        if self.regions.contains_key(&coord) {
            return Ok(Materialization::AlreadyReady);
        }
        let _ = self.region_or_generate(coord);
        Ok(Materialization::Materialized)
    }

    fn load(&mut self, coord: RegionCoord) -> Result<Materialization, RegionUnavailable> {
        if self.unavailable.contains(&coord) {
            return Err(RegionUnavailable::new(coord));
        }
        if self.resident.contains(&coord) {
            return Ok(Materialization::AlreadyReady);
        }
        let _ = self.region_or_generate(coord);
        if self.stuck.contains(&coord) {
            debug!("region {coord} accepted a load but is stuck");
        } else {
            let _ = self.resident.insert(coord);
        }
        Ok(Materialization::Materialized)
    }

    fn pin(&mut self, coord: RegionCoord) {
        let _ = self.pinned.insert(coord);
    }

    fn unpin(&mut self, coord: RegionCoord) {
        if self.pinned.remove(&coord) {
            let _ = self.resident.remove(&coord);
        }
    }

    fn is_resident(&self, coord: RegionCoord) -> bool {
        self.resident.contains(&coord) && !self.unavailable.contains(&coord)
    }

    fn request_residency(&mut self, coord: RegionCoord) -> Result<(), RegionUnavailable> {
        let _ = self.load(coord)?;
        Ok(())
    }

    fn height_range(&self) -> (i32, i32) {
        (self.settings.min_y, self.settings.max_y)
    }

    fn cell(&self, pos: BlockPos) -> Result<Cell, RegionUnavailable> {
        let coord = pos.region();
        self.accessible(coord)?;
        let Some(index) = cell_index(&self.settings, pos) else {
            return Ok(Cell::Empty);
        };
        Ok(self
            .regions
            .get(&coord)
            .map_or(Cell::Empty, |region| region.cells[index]))
    }

    fn set_cell(&mut self, pos: BlockPos, cell: Cell) -> Result<(), RegionUnavailable> {
        let coord = pos.region();
        self.accessible(coord)?;
        let settings = self.settings;
        let Some(index) = cell_index(&settings, pos) else {
            return Ok(());
        };
        let region = self.region_or_generate(coord);
        region.cells[index] = cell;
        self.edits += 1;
        Ok(())
    }

    fn supports_bulk_fluid_clear(&self) -> bool {
        self.settings.bulk_fluid_clear
    }

    fn clear_fluids(
        &mut self,
        coord: RegionCoord,
        min_y: i32,
        max_y: i32,
    ) -> Result<u64, RegionUnavailable> {
        self.accessible(coord)?;
        let settings = self.settings;
        let region = self.region_or_generate(coord);
        let mut cleared = 0;
        for y in min_y.max(settings.min_y)..max_y.min(settings.max_y) {
            for lz in 0..REGION_EDGE {
                for lx in 0..REGION_EDGE {
                    let pos = BlockPos::new(
                        coord.min_block_x() + lx,
                        y,
                        coord.min_block_z() + lz,
                    );
                    let Some(index) = cell_index(&settings, pos) else {
                        continue;
                    };
                    if matches!(region.cells[index], Cell::Fluid(_)) {
                        region.cells[index] = Cell::Empty;
                        cleared += 1;
                    }
                }
            }
        }
        self.edits += cleared;
        Ok(cleared)
    }

    fn regenerate(&mut self, coord: RegionCoord) -> Result<(), RegionUnavailable> {
        if self.unavailable.contains(&coord) {
            return Err(RegionUnavailable::new(coord));
        }
        let _ = self
            .regions
            .insert(coord, Region::generate(&self.settings, coord));
        self.generations += 1;
        Ok(())
    }

    fn world_border(&self) -> WorldBorder {
        self.border
    }

    fn apply_border(&mut self, border: WorldBorder) {
        self.border = border;
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use collapse_core::{BlockPos, Cell, RegionCoord};

    use super::{cell_index, World};

    /// Reads a cell without residency checks; `None` for ungenerated regions.
    #[must_use]
    pub fn cell(world: &World, pos: BlockPos) -> Option<Cell> {
        let region = world.regions.get(&pos.region())?;
        cell_index(&world.settings, pos).map(|index| region.cells[index])
    }

    /// Counts cells of a generated region that satisfy the predicate.
    #[must_use]
    pub fn count_cells<F>(world: &World, coord: RegionCoord, mut predicate: F) -> usize
    where
        F: FnMut(Cell) -> bool,
    {
        world.regions.get(&coord).map_or(0, |region| {
            region.cells.iter().copied().filter(|cell| predicate(*cell)).count()
        })
    }

    /// Counts solid cells in a generated region.
    #[must_use]
    pub fn solid_cells(world: &World, coord: RegionCoord) -> usize {
        count_cells(world, coord, |cell| matches!(cell, Cell::Solid(_)))
    }

    /// Counts fluid cells in a generated region.
    #[must_use]
    pub fn fluid_cells(world: &World, coord: RegionCoord) -> usize {
        count_cells(world, coord, |cell| matches!(cell, Cell::Fluid(_)))
    }

    /// Reports whether the region has been generated.
    #[must_use]
    pub fn is_generated(world: &World, coord: RegionCoord) -> bool {
        world.regions.contains_key(&coord)
    }

    /// Reports whether the region carries a keep-resident ticket.
    #[must_use]
    pub fn is_pinned(world: &World, coord: RegionCoord) -> bool {
        world.pinned.contains(&coord)
    }

    /// Number of regions carrying a keep-resident ticket.
    #[must_use]
    pub fn pinned_count(world: &World) -> usize {
        world.pinned.len()
    }

    /// Number of single-cell writes performed through the backend.
    #[must_use]
    pub fn edit_count(world: &World) -> u64 {
        world.edits
    }

    /// Number of region generations, including regenerations.
    #[must_use]
    pub fn generation_count(world: &World) -> u64 {
        world.generations
    }
}

#[derive(Clone, Debug)]
struct Region {
    cells: Vec<Cell>,
}

impl Region {
    fn generate(settings: &WorldSettings, coord: RegionCoord) -> Self {
        let height = settings.height();
        let mut cells = vec![Cell::Empty; EDGE * EDGE * height];

        match settings.terrain {
            Terrain::Empty => {}
            Terrain::Flat {
                height: top,
                block,
            } => {
                for y in settings.min_y..top.min(settings.max_y) {
                    for lz in 0..EDGE {
                        for lx in 0..EDGE {
                            cells[local_index(settings, lx, y, lz)] = Cell::Solid(block);
                        }
                    }
                }
            }
            Terrain::Seeded {
                seed,
                surface,
                sea_level,
            } => {
                let salt = (coord.pack() as u64).wrapping_mul(REGION_SALT);
                let mut rng = ChaCha8Rng::seed_from_u64(seed ^ salt);
                for lz in 0..EDGE {
                    for lx in 0..EDGE {
                        let column_top: i32 = surface + rng.gen_range(-3..=3);
                        for y in settings.min_y..settings.max_y {
                            let cell = if y == settings.min_y {
                                Cell::Solid(BEDROCK)
                            } else if y < column_top - 1 {
                                Cell::Solid(STONE)
                            } else if y == column_top - 1 {
                                Cell::Solid(GRASS)
                            } else if y < sea_level {
                                Cell::Fluid(WATER)
                            } else {
                                Cell::Empty
                            };
                            cells[local_index(settings, lx, y, lz)] = cell;
                        }
                    }
                }
            }
        }

        Self { cells }
    }
}

fn local_index(settings: &WorldSettings, lx: usize, y: i32, lz: usize) -> usize {
    let layer = usize::try_from(y - settings.min_y).unwrap_or(0);
    (layer * EDGE + lz) * EDGE + lx
}

fn cell_index(settings: &WorldSettings, pos: BlockPos) -> Option<usize> {
    if pos.y < settings.min_y || pos.y >= settings.max_y {
        return None;
    }
    let lx = usize::try_from(pos.x.rem_euclid(REGION_EDGE)).ok()?;
    let lz = usize::try_from(pos.z.rem_euclid(REGION_EDGE)).ok()?;
    Some(local_index(settings, lx, pos.y, lz))
}
