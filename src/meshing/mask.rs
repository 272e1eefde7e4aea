//! Packed per-face records for the greedy mesher.
//!
//! Two adjacent faces merge into one quad exactly when their masks compare
//! equal, so every attribute that affects rendering must live in the mask.

use crate::world::registry::MaterialId;

/// A packed face record.
///
/// Layout:
///
/// ```text
/// bits 0:8   AO, four 2-bit corner values
/// bit  8     direction, set for +axis
/// bit  9     lit, set when the face sees full sunlight
/// bits 10:20 material id
/// ```
///
/// A zero mask means "no face here".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FaceMask(u32);

impl FaceMask {
    /// The absent face.
    pub const EMPTY: FaceMask = FaceMask(0);

    /// Packs a face record. A real face always has a non-`NONE` material,
    /// so it never compares equal to [`FaceMask::EMPTY`].
    #[inline]
    pub fn pack(material: MaterialId, dir: i32, lit: bool, ao: u8) -> FaceMask {
        debug_assert!(material != MaterialId::NONE);
        FaceMask(
            (material.0 as u32) << 10
                | (lit as u32) << 9
                | ((dir > 0) as u32) << 8
                | ao as u32,
        )
    }

    /// Whether this mask holds no face.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The packed corner AO.
    #[inline]
    pub fn ao(self) -> u8 {
        self.0 as u8
    }

    /// The face direction along the sweep axis, `+1` or `-1`.
    #[inline]
    pub fn dir(self) -> i32 {
        if self.0 & 0x100 != 0 { 1 } else { -1 }
    }

    /// Whether the face is in full sunlight.
    #[inline]
    pub fn lit(self) -> bool {
        self.0 & 0x200 != 0
    }

    /// The face material.
    #[inline]
    pub fn material(self) -> MaterialId {
        MaterialId((self.0 >> 10) as u8)
    }

    /// Bitwise union, used to skip all-empty rows and slices quickly.
    #[inline]
    pub fn union(self, other: FaceMask) -> FaceMask {
        FaceMask(self.0 | other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_round_trip() {
        let mask = FaceMask::pack(MaterialId(200), -1, true, 0b1001_0110);
        assert_eq!(mask.material(), MaterialId(200));
        assert_eq!(mask.dir(), -1);
        assert!(mask.lit());
        assert_eq!(mask.ao(), 0b1001_0110);
        assert!(!mask.is_empty());
    }

    #[test]
    fn differing_faces_do_not_compare_equal() {
        let a = FaceMask::pack(MaterialId(3), 1, false, 0);
        assert_ne!(a, FaceMask::pack(MaterialId(4), 1, false, 0));
        assert_ne!(a, FaceMask::pack(MaterialId(3), -1, false, 0));
        assert_ne!(a, FaceMask::pack(MaterialId(3), 1, true, 0));
        assert_ne!(a, FaceMask::pack(MaterialId(3), 1, false, 1));
        assert_eq!(a, FaceMask::pack(MaterialId(3), 1, false, 0));
    }

    #[test]
    fn unlit_unoccluded_face_is_still_a_face() {
        let mask = FaceMask::pack(MaterialId(1), -1, false, 0);
        assert!(!mask.is_empty());
    }
}
