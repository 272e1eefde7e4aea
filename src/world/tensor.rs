//! # Tensor Module
//!
//! Dense 2-D and 3-D array storage for per-chunk voxel data.
//!
//! The 3-D layout is chosen so that a full vertical column is contiguous
//! (`y` has stride 1). For chunk-sized tensors the strides are powers of
//! two, which lets the lighting code step between neighboring cells with
//! plain index arithmetic: a chunk voxel index is `y | x << 8 | z << 12`.
//!
//! Mesh-sized tensors carry a one-voxel halo on every side. The halo rows
//! hold copies of neighboring chunks (or synthetic bedrock/air at the
//! vertical extremes) so that ambient occlusion can sample across chunk
//! borders without bounds checks.

use super::{CHUNK_WIDTH, WORLD_HEIGHT};

/// A dense 2-D array indexed by `(x, z)`.
///
/// The stride along `x` is 1; a chunk-sized heightmap index equals the
/// corresponding voxel index shifted right by 8.
pub struct Tensor2<T> {
    /// Flat storage, length `shape[0] * shape[1]`.
    pub data: Vec<T>,
    /// The extent along each axis, `[x, z]`.
    pub shape: [usize; 2],
}

impl<T: Copy> Tensor2<T> {
    /// Creates a chunk-sized (16 x 16) tensor filled with `value`.
    pub fn chunk(value: T) -> Self {
        Tensor2 {
            data: vec![value; CHUNK_WIDTH * CHUNK_WIDTH],
            shape: [CHUNK_WIDTH, CHUNK_WIDTH],
        }
    }

    /// Creates a mesh-sized (18 x 18) tensor with a one-cell halo.
    pub fn mesh(value: T) -> Self {
        let w = CHUNK_WIDTH + 2;
        Tensor2 {
            data: vec![value; w * w],
            shape: [w, w],
        }
    }

    /// Computes the flat index of `(x, z)`.
    #[inline]
    pub fn index(&self, x: usize, z: usize) -> usize {
        debug_assert!(x < self.shape[0] && z < self.shape[1]);
        x + z * self.shape[0]
    }

    /// Reads the value at `(x, z)`.
    #[inline]
    pub fn get(&self, x: usize, z: usize) -> T {
        self.data[self.index(x, z)]
    }

    /// Writes the value at `(x, z)`.
    #[inline]
    pub fn set(&mut self, x: usize, z: usize, value: T) {
        let index = self.index(x, z);
        self.data[index] = value;
    }
}

/// A dense 3-D array indexed by `(x, y, z)` with contiguous columns.
pub struct Tensor3<T> {
    /// Flat storage, length `shape[0] * shape[1] * shape[2]`.
    pub data: Vec<T>,
    /// The extent along each axis, `[x, y, z]`.
    pub shape: [usize; 3],
    /// The flat-index step along each axis, `[x, y, z]`; `stride[1] == 1`.
    pub stride: [usize; 3],
}

impl<T: Copy> Tensor3<T> {
    /// Creates a chunk-sized (16 x 256 x 16) tensor filled with `value`.
    ///
    /// The strides are `[256, 1, 4096]`, so indices decompose bitwise as
    /// `y | x << 8 | z << 12`.
    pub fn chunk(value: T) -> Self {
        Tensor3 {
            data: vec![value; CHUNK_WIDTH * WORLD_HEIGHT * CHUNK_WIDTH],
            shape: [CHUNK_WIDTH, WORLD_HEIGHT, CHUNK_WIDTH],
            stride: [WORLD_HEIGHT, 1, CHUNK_WIDTH * WORLD_HEIGHT],
        }
    }

    /// Creates a mesh-sized (18 x 258 x 18) tensor with a one-cell halo.
    pub fn mesh(value: T) -> Self {
        let w = CHUNK_WIDTH + 2;
        let h = WORLD_HEIGHT + 2;
        Tensor3 {
            data: vec![value; w * h * w],
            shape: [w, h, w],
            stride: [h, 1, w * h],
        }
    }

    /// Computes the flat index of `(x, y, z)`.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < self.shape[0] && y < self.shape[1] && z < self.shape[2]);
        y + x * self.stride[0] + z * self.stride[2]
    }

    /// Reads the value at `(x, y, z)`.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> T {
        self.data[self.index(x, y, z)]
    }

    /// Writes the value at `(x, y, z)`.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: T) {
        let index = self.index(x, y, z);
        self.data[index] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_index_is_bitwise() {
        let tensor = Tensor3::chunk(0u8);
        for _ in 0..64 {
            let x = fastrand::usize(0..CHUNK_WIDTH);
            let y = fastrand::usize(0..WORLD_HEIGHT);
            let z = fastrand::usize(0..CHUNK_WIDTH);
            assert_eq!(tensor.index(x, y, z), y | x << 8 | z << 12);
        }
    }

    #[test]
    fn columns_are_contiguous() {
        let mut tensor = Tensor3::mesh(0u8);
        let base = tensor.index(3, 0, 7);
        for y in 0..tensor.shape[1] {
            assert_eq!(tensor.index(3, y, 7), base + y);
        }
        tensor.set(3, 5, 7, 9);
        assert_eq!(tensor.data[base + 5], 9);
    }

    #[test]
    fn heightmap_index_matches_voxel_index() {
        let voxels = Tensor3::chunk(0u8);
        let heightmap = Tensor2::chunk(0u8);
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                assert_eq!(heightmap.index(x, z), voxels.index(x, 0, z) >> 8);
            }
        }
    }
}
