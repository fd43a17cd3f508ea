//! Key grid layout types.

use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::metadata::KeyDetails;

/// Layout of a rectangular grid of equally sized, equally spaced keys.
///
/// Keys are numbered row by row, starting at the top left corner. Every
/// constructed layout has its pixel extents within `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "KeyDetails", into = "KeyDetails")]
pub struct GridKeyLayout {
    count_x: u16,
    count_y: u16,
    key_size: u32,
    gap_size: u32,
}

/// Pixel rectangle of a single key inside the board area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl GridKeyLayout {
    /// Create a layout with `count_x` × `count_y` keys of `key_size` pixels,
    /// separated by `gap_size` pixels.
    pub fn new(
        count_x: u16,
        count_y: u16,
        key_size: u32,
        gap_size: u32,
    ) -> Result<Self, TypesError> {
        if count_x == 0 || count_y == 0 {
            return Err(TypesError::InvalidLayout(format!(
                "key count must be positive, got {count_x}x{count_y}"
            )));
        }
        if key_size == 0 {
            return Err(TypesError::InvalidLayout(
                "key size must be positive".to_string(),
            ));
        }
        let layout = Self {
            count_x,
            count_y,
            key_size,
            gap_size,
        };
        if key_size.checked_add(gap_size).is_none()
            || layout.extent(count_x).is_none()
            || layout.extent(count_y).is_none()
        {
            return Err(TypesError::InvalidLayout(format!(
                "{count_x}x{count_y} keys of {key_size}px with {gap_size}px gaps overflow the pixel range"
            )));
        }
        Ok(layout)
    }

    fn extent(&self, count: u16) -> Option<u32> {
        let count = u32::from(count);
        count
            .checked_mul(self.key_size)?
            .checked_add(count.saturating_sub(1).checked_mul(self.gap_size)?)
    }

    #[must_use]
    pub fn count_x(&self) -> u16 {
        self.count_x
    }

    #[must_use]
    pub fn count_y(&self) -> u16 {
        self.count_y
    }

    #[must_use]
    pub fn key_size(&self) -> u32 {
        self.key_size
    }

    #[must_use]
    pub fn gap_size(&self) -> u32 {
        self.gap_size
    }

    /// Total number of keys.
    #[must_use]
    pub fn count(&self) -> usize {
        usize::from(self.count_x) * usize::from(self.count_y)
    }

    /// Whether `key` is a valid key index for this layout.
    #[must_use]
    pub fn contains(&self, key: u16) -> bool {
        usize::from(key) < self.count()
    }

    /// Index of the key at grid column `x` and row `y`.
    #[must_use]
    pub fn key_index(&self, x: u16, y: u16) -> Option<u16> {
        if x >= self.count_x || y >= self.count_y {
            return None;
        }
        let index = u32::from(y) * u32::from(self.count_x) + u32::from(x);
        u16::try_from(index).ok()
    }

    /// Pixel rectangle of `key`, relative to the top left corner of the
    /// first key.
    #[must_use]
    pub fn key_rect(&self, key: u16) -> Option<KeyRect> {
        if !self.contains(key) {
            return None;
        }
        let column = u32::from(key % self.count_x);
        let row = u32::from(key / self.count_x);
        let pitch = self.key_size.checked_add(self.gap_size)?;
        Some(KeyRect {
            x: column.checked_mul(pitch)?,
            y: row.checked_mul(pitch)?,
            width: self.key_size,
            height: self.key_size,
        })
    }

    /// Width and height of the area covered by all keys (gaps between keys
    /// included, outer margin excluded).
    #[must_use]
    pub fn area(&self) -> (u32, u32) {
        (
            self.extent(self.count_x).unwrap_or(u32::MAX),
            self.extent(self.count_y).unwrap_or(u32::MAX),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> GridKeyLayout {
        GridKeyLayout::new(5, 3, 72, 25).unwrap()
    }

    #[test]
    fn count_is_product_of_columns_and_rows() {
        assert_eq!(layout().count(), 15);
        assert!(layout().contains(14));
        assert!(!layout().contains(15));
    }

    #[test]
    fn zero_sized_layouts_are_rejected() {
        assert!(GridKeyLayout::new(0, 3, 72, 25).is_err());
        assert!(GridKeyLayout::new(5, 0, 72, 25).is_err());
        assert!(GridKeyLayout::new(5, 3, 0, 25).is_err());
    }

    #[test]
    fn key_index_is_row_major() {
        let l = layout();
        assert_eq!(l.key_index(0, 0), Some(0));
        assert_eq!(l.key_index(4, 0), Some(4));
        assert_eq!(l.key_index(0, 1), Some(5));
        assert_eq!(l.key_index(4, 2), Some(14));
        assert_eq!(l.key_index(5, 0), None);
        assert_eq!(l.key_index(0, 3), None);
    }

    #[test]
    fn key_rect_includes_gaps() {
        let l = layout();
        let rect = l.key_rect(6).unwrap();
        assert_eq!(rect.x, 97);
        assert_eq!(rect.y, 97);
        assert_eq!(rect.width, 72);
        assert!(l.key_rect(15).is_none());
    }

    #[test]
    fn layouts_beyond_the_pixel_range_are_rejected() {
        assert!(GridKeyLayout::new(5, 3, 72, u32::MAX).is_err());
        assert!(GridKeyLayout::new(5, 3, 4_000_000_000, 25).is_err());
        assert!(GridKeyLayout::new(1, 1, u32::MAX, 1).is_err());

        let single = GridKeyLayout::new(1, 1, u32::MAX, 0).unwrap();
        assert_eq!(single.area(), (u32::MAX, u32::MAX));
        assert_eq!(single.key_rect(0).unwrap().x, 0);
    }

    #[test]
    fn deserializing_goes_through_validation() {
        let layout: GridKeyLayout =
            serde_json::from_str(r#"{"x":5,"y":3,"s":72,"g":25}"#).unwrap();
        assert_eq!(layout, self::layout());
        assert!(serde_json::from_str::<GridKeyLayout>(r#"{"x":0,"y":3,"s":72,"g":25}"#).is_err());
        assert!(
            serde_json::from_str::<GridKeyLayout>(r#"{"x":5,"y":3,"s":72,"g":4294967295}"#)
                .is_err()
        );
    }

    #[test]
    fn area_excludes_outer_margin() {
        assert_eq!(layout().area(), (5 * 72 + 4 * 25, 3 * 72 + 2 * 25));
    }
}
