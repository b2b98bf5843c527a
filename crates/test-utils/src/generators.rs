//! Synthetic raster data and payload generators.
//!
//! Raster generators return row-major `f32` buffers ready for
//! `Raster::single_band`.

/// Row-major grid whose value is the pixel's index, `row * width + col`.
///
/// ```
/// use test_utils::create_index_grid;
///
/// let grid = create_index_grid(4, 3);
/// assert_eq!(grid[5], 5.0); // col 1, row 1
/// ```
pub fn create_index_grid(width: usize, height: usize) -> Vec<f32> {
    (0..width * height).map(|i| i as f32).collect()
}

/// Creates a grid filled with a single value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a population-count-like grid: a smooth bump peaking at the centre.
///
/// Values are non-negative and the peak equals `peak`.
pub fn create_population_grid(width: usize, height: usize, peak: f32) -> Vec<f32> {
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let scale = (cx * cx + cy * cy).max(1.0);
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let dx = col as f32 - cx;
            let dy = row as f32 - cy;
            data.push(peak * (1.0 - (dx * dx + dy * dy) / scale).max(0.0));
        }
    }
    data
}

/// Creates a grid with a fill value at the given `(col, row)` positions and
/// ones elsewhere.
pub fn create_grid_with_fill(
    width: usize,
    height: usize,
    fill_value: f32,
    fill_positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = vec![1.0f32; width * height];
    for &(col, row) in fill_positions {
        if col < width && row < height {
            data[row * width + col] = fill_value;
        }
    }
    data
}

/// Deterministic pseudo-random payload for download tests.
pub fn create_payload(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_grid_is_row_major() {
        let grid = create_index_grid(10, 5);
        assert_eq!(grid.len(), 50);
        assert_eq!(grid[23], 23.0);
    }

    #[test]
    fn test_population_grid_peaks_at_centre() {
        let grid = create_population_grid(5, 5, 100.0);
        assert_eq!(grid[12], 100.0);
        assert!(grid.iter().all(|&v| (0.0..=100.0).contains(&v)));
        assert!(grid[0] < grid[6]);
    }

    #[test]
    fn test_create_grid_with_fill() {
        let grid = create_grid_with_fill(4, 4, -99999.0, &[(1, 2), (9, 9)]);
        assert_eq!(grid[9], -99999.0);
        assert_eq!(grid.iter().filter(|&&v| v == -99999.0).count(), 1);
    }

    #[test]
    fn test_payload_deterministic() {
        assert_eq!(create_payload(64, 7), create_payload(64, 7));
        assert_ne!(create_payload(64, 7), create_payload(64, 8));
    }
}
