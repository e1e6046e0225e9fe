use glam::Vec3;

/// Uniform spatial hash grid for neighbour queries within one particle range.
///
/// Counting sort build: count particles per cell -> prefix sum -> scatter.
/// The hash table grows with the particle count, so one grid can be reused
/// for ranges of any size.
pub struct SpatialHashGrid {
    inv_cell_size: f32,
    table_size: usize,
    /// cell_count[hash] = number of particles in the cell
    cell_count: Vec<u32>,
    /// cell_start[hash] = first slot of the cell in sorted_indices
    cell_start: Vec<u32>,
    sorted_indices: Vec<u32>,
    particle_hashes: Vec<u32>,
}

impl SpatialHashGrid {
    /// `cell_size` should be at least the largest interaction distance.
    pub fn new(cell_size: f32) -> Self {
        Self {
            inv_cell_size: 1.0 / cell_size.max(1e-6),
            table_size: 0,
            cell_count: Vec::new(),
            cell_start: Vec::new(),
            sorted_indices: Vec::new(),
            particle_hashes: Vec::new(),
        }
    }

    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.inv_cell_size = 1.0 / cell_size.max(1e-6);
    }

    pub fn build(&mut self, positions: &[Vec3]) {
        let count = positions.len();
        let table_size = (2 * count).next_power_of_two().max(64);
        if table_size != self.table_size {
            self.table_size = table_size;
            self.cell_count.resize(table_size, 0);
            self.cell_start.resize(table_size, 0);
        }
        self.sorted_indices.resize(count, 0);
        self.particle_hashes.resize(count, 0);

        self.cell_count.fill(0);
        for (i, &p) in positions.iter().enumerate() {
            let (cx, cy, cz) = self.cell_coords(p);
            let h = self.hash_cell(cx, cy, cz);
            self.particle_hashes[i] = h as u32;
            self.cell_count[h] += 1;
        }

        self.cell_start[0] = 0;
        for k in 1..self.table_size {
            self.cell_start[k] = self.cell_start[k - 1] + self.cell_count[k - 1];
        }

        // Reuse cell_count as scatter cursor.
        self.cell_count.fill(0);
        for i in 0..count {
            let h = self.particle_hashes[i] as usize;
            let idx = self.cell_start[h] + self.cell_count[h];
            self.sorted_indices[idx as usize] = i as u32;
            self.cell_count[h] += 1;
        }
    }

    /// Call `callback` for every particle in the 3x3x3 cells around `pos`.
    /// The caller does the distance check; hash collisions can report the
    /// same particle more than once.
    pub fn query_neighbors<F: FnMut(u32)>(&self, pos: Vec3, mut callback: F) {
        if self.table_size == 0 {
            return;
        }
        let (cx, cy, cz) = self.cell_coords(pos);
        for dx in -1..=1_i32 {
            for dy in -1..=1_i32 {
                for dz in -1..=1_i32 {
                    let h = self.hash_cell(cx + dx, cy + dy, cz + dz);
                    let start = self.cell_start[h] as usize;
                    let end = start + self.cell_count[h] as usize;
                    for idx in start..end {
                        callback(self.sorted_indices[idx]);
                    }
                }
            }
        }
    }

    #[inline]
    fn hash_cell(&self, cx: i32, cy: i32, cz: i32) -> usize {
        let h = (cx as u32).wrapping_mul(73856093)
            ^ (cy as u32).wrapping_mul(19349663)
            ^ (cz as u32).wrapping_mul(83492791);
        (h as usize) & (self.table_size - 1)
    }

    #[inline]
    fn cell_coords(&self, pos: Vec3) -> (i32, i32, i32) {
        (
            (pos.x * self.inv_cell_size).floor() as i32,
            (pos.y * self.inv_cell_size).floor() as i32,
            (pos.z * self.inv_cell_size).floor() as i32,
        )
    }
}
