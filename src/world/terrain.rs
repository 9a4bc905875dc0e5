// src/world/terrain.rs
//! Terrain grid codec
//!
//! A room's terrain is a 50×50 grid of classifications stored sparsely
//! (only non-plain cells are held) and serialized to a fixed 2500-character
//! string for the store. The wire contract is bit-exact: position
//! `i = y * 50 + x` (y outer, x inner) holds the classification index,
//! `0` plain, `1` wall, `2` swamp.

use crate::utils::errors::{Result, ServerError};
use std::collections::HashMap;

/// Side length of a room grid
pub const ROOM_SIZE: u32 = 50;

const GRID_LEN: usize = (ROOM_SIZE * ROOM_SIZE) as usize;

/// Per-cell terrain classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TerrainKind {
    #[default]
    Plain,
    Wall,
    Swamp,
}

impl TerrainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerrainKind::Plain => "plain",
            TerrainKind::Wall => "wall",
            TerrainKind::Swamp => "swamp",
        }
    }

    /// Parse a classification name
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "plain" => Ok(TerrainKind::Plain),
            "wall" => Ok(TerrainKind::Wall),
            "swamp" => Ok(TerrainKind::Swamp),
            other => Err(ServerError::InvalidTerrain(other.to_string())),
        }
    }

    /// Serialized digit of this classification
    pub fn mask(&self) -> char {
        match self {
            TerrainKind::Plain => '0',
            TerrainKind::Wall => '1',
            TerrainKind::Swamp => '2',
        }
    }

    /// Classification for a serialized digit
    pub fn from_mask(mask: char) -> Result<Self> {
        match mask {
            '0' => Ok(TerrainKind::Plain),
            '1' => Ok(TerrainKind::Wall),
            '2' => Ok(TerrainKind::Swamp),
            other => Err(ServerError::InvalidTerrainMask(other)),
        }
    }
}

/// Sparse 50×50 terrain grid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerrainMatrix {
    cells: HashMap<(u32, u32), TerrainKind>,
}

impl TerrainMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classification at a cell; unset cells read as plain.
    pub fn get(&self, x: u32, y: u32) -> TerrainKind {
        self.cells.get(&(x, y)).copied().unwrap_or_default()
    }

    /// Set a cell's classification.
    ///
    /// Setting plain clears the cell so the grid stays sparse. Coordinates
    /// outside the grid are rejected with no mutation.
    pub fn set(&mut self, x: u32, y: u32, kind: TerrainKind) -> Result<()> {
        if x >= ROOM_SIZE || y >= ROOM_SIZE {
            return Err(ServerError::InvalidCoordinates {
                x: x as i64,
                y: y as i64,
            });
        }
        if kind == TerrainKind::Plain {
            self.cells.remove(&(x, y));
        } else {
            self.cells.insert((x, y), kind);
        }
        Ok(())
    }

    /// Serialize to the fixed 2500-character wire form, y outer / x inner.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(GRID_LEN);
        for y in 0..ROOM_SIZE {
            for x in 0..ROOM_SIZE {
                out.push(self.get(x, y).mask());
            }
        }
        out
    }

    /// Rebuild a grid from its wire form.
    ///
    /// Fails on any unknown digit or on a string that is not exactly 2500
    /// characters long.
    pub fn unserialize(data: &str) -> Result<Self> {
        if data.chars().count() != GRID_LEN {
            return Err(ServerError::InvalidTerrainLength(data.chars().count()));
        }
        let mut matrix = Self::new();
        for (i, mask) in data.chars().enumerate() {
            let kind = TerrainKind::from_mask(mask)?;
            if kind != TerrainKind::Plain {
                let x = i as u32 % ROOM_SIZE;
                let y = i as u32 / ROOM_SIZE;
                matrix.set(x, y, kind)?;
            }
        }
        Ok(matrix)
    }

    /// Number of non-plain cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_is_plain() {
        let matrix = TerrainMatrix::new();
        assert_eq!(matrix.get(0, 0), TerrainKind::Plain);
        assert_eq!(matrix.get(49, 49), TerrainKind::Plain);
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_set_out_of_range_is_rejected() {
        let mut matrix = TerrainMatrix::new();
        assert!(matrix.set(50, 0, TerrainKind::Wall).is_err());
        assert!(matrix.set(0, 50, TerrainKind::Wall).is_err());
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_set_plain_clears_cell() {
        let mut matrix = TerrainMatrix::new();
        matrix.set(3, 4, TerrainKind::Wall).unwrap();
        assert_eq!(matrix.len(), 1);
        matrix.set(3, 4, TerrainKind::Plain).unwrap();
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_serialize_shape() {
        let mut matrix = TerrainMatrix::new();
        matrix.set(12, 34, TerrainKind::Swamp).unwrap();
        let serial = matrix.serialize();
        assert_eq!(serial.len(), 2500);
        assert!(serial.chars().all(|c| matches!(c, '0' | '1' | '2')));
    }

    #[test]
    fn test_serialize_ordering_contract() {
        // (0,0) wall then (1,0) swamp serializes as "12" followed by zeros:
        // position i = y*50 + x, y outer, x inner.
        let mut matrix = TerrainMatrix::new();
        matrix.set(0, 0, TerrainKind::Wall).unwrap();
        matrix.set(1, 0, TerrainKind::Swamp).unwrap();
        let serial = matrix.serialize();
        assert!(serial.starts_with("12"));
        assert!(serial[2..].chars().all(|c| c == '0'));

        // And the y coordinate lands a full row further in.
        let mut matrix = TerrainMatrix::new();
        matrix.set(0, 1, TerrainKind::Wall).unwrap();
        let serial = matrix.serialize();
        assert_eq!(serial.chars().nth(50), Some('1'));
    }

    #[test]
    fn test_unserialize_rejects_bad_mask() {
        let data = format!("3{}", "0".repeat(2499));
        assert!(matches!(
            TerrainMatrix::unserialize(&data),
            Err(ServerError::InvalidTerrainMask('3'))
        ));
    }

    #[test]
    fn test_unserialize_rejects_bad_length() {
        assert!(matches!(
            TerrainMatrix::unserialize("012"),
            Err(ServerError::InvalidTerrainLength(3))
        ));
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(TerrainKind::parse("swamp").unwrap(), TerrainKind::Swamp);
        assert!(TerrainKind::parse("lava").is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip(cells in proptest::collection::vec(
            (0u32..50, 0u32..50, 0usize..3),
            0..200,
        )) {
            let mut matrix = TerrainMatrix::new();
            for (x, y, k) in cells {
                let kind = [TerrainKind::Plain, TerrainKind::Wall, TerrainKind::Swamp][k];
                matrix.set(x, y, kind).unwrap();
            }
            let decoded = TerrainMatrix::unserialize(&matrix.serialize()).unwrap();
            prop_assert_eq!(decoded, matrix);
        }

        #[test]
        fn prop_serialize_is_total(cells in proptest::collection::vec(
            (0u32..50, 0u32..50),
            0..100,
        )) {
            let mut matrix = TerrainMatrix::new();
            for (x, y) in cells {
                matrix.set(x, y, TerrainKind::Wall).unwrap();
            }
            let serial = matrix.serialize();
            prop_assert_eq!(serial.len(), 2500);
            prop_assert!(serial.chars().all(|c| matches!(c, '0' | '1' | '2')));
        }
    }
}
