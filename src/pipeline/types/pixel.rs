use serde::{Deserialize, Serialize};
use std::fmt;

/// Heads 0 and 1 are the two suction cups; heads 2.. are the grasp
/// orientations.
pub const SUCTION_HEADS: usize = 2;

/// Location of one selected action in the stacked affordance maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelIndex {
    pub head: usize,
    pub row: usize,
    pub col: usize,
}

impl PixelIndex {
    pub fn new(head: usize, row: usize, col: usize) -> Self {
        Self { head, row, col }
    }

    /// The head alone determines the action family.
    pub fn family(&self) -> ActionFamily {
        match self.head {
            0 => ActionFamily::SuctionA,
            1 => ActionFamily::SuctionB,
            _ => ActionFamily::Grasp,
        }
    }

    /// Orientation slot into the grasp angle table, `None` for suction.
    pub fn rotation_index(&self) -> Option<usize> {
        (self.head >= SUCTION_HEADS).then(|| self.head - SUCTION_HEADS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionFamily {
    SuctionA,
    SuctionB,
    Grasp,
}

impl ActionFamily {
    pub fn is_suction(&self) -> bool {
        !matches!(self, ActionFamily::Grasp)
    }

    /// Tool id understood by the arm controller.
    pub fn tool_id(&self) -> u8 {
        match self {
            ActionFamily::SuctionA => 3,
            ActionFamily::SuctionB => 2,
            ActionFamily::Grasp => 1,
        }
    }
}

impl fmt::Display for ActionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionFamily::SuctionA => "suction-a",
            ActionFamily::SuctionB => "suction-b",
            ActionFamily::Grasp => "grasp",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_determines_family_and_rotation() {
        assert_eq!(PixelIndex::new(0, 1, 2).family(), ActionFamily::SuctionA);
        assert_eq!(PixelIndex::new(1, 0, 0).family(), ActionFamily::SuctionB);
        assert_eq!(PixelIndex::new(2, 0, 0).family(), ActionFamily::Grasp);
        assert_eq!(PixelIndex::new(0, 0, 0).rotation_index(), None);
        assert_eq!(PixelIndex::new(1, 0, 0).rotation_index(), None);
        assert_eq!(PixelIndex::new(2, 0, 0).rotation_index(), Some(0));
        assert_eq!(PixelIndex::new(5, 0, 0).rotation_index(), Some(3));
    }

    #[test]
    fn tool_ids_match_arm_controller() {
        assert_eq!(ActionFamily::SuctionA.tool_id(), 3);
        assert_eq!(ActionFamily::SuctionB.tool_id(), 2);
        assert_eq!(ActionFamily::Grasp.tool_id(), 1);
    }
}
