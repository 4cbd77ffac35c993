//! Collision layers
//!
//! Every shape belongs to one group and carries a mask of the groups it
//! collides with. Queries pass a mask of the groups they want to hit.

use serde::{Deserialize, Serialize};

/// Collision group a shape belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Camera,
    Player,
    Environment,
    Prop,
    Tool,
}

/// Bitmask over [`Layer`] groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);
    pub const ALL: LayerMask = LayerMask(u32::MAX);

    /// What ground probes and platform probes hit
    pub const GROUND: LayerMask =
        LayerMask(Layer::Environment.group().0 | Layer::Prop.group().0);

    pub const fn contains(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: LayerMask) -> LayerMask {
        LayerMask(self.0 | other.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for LayerMask {
    type Output = LayerMask;

    fn bitor(self, rhs: LayerMask) -> LayerMask {
        self.union(rhs)
    }
}

impl From<Layer> for LayerMask {
    fn from(layer: Layer) -> Self {
        layer.group()
    }
}

impl Layer {
    pub const ALL: [Layer; 5] = [
        Layer::Camera,
        Layer::Player,
        Layer::Environment,
        Layer::Prop,
        Layer::Tool,
    ];

    /// The single bit identifying this group
    pub const fn group(self) -> LayerMask {
        LayerMask(match self {
            Layer::Camera => 1 << 0,
            Layer::Player => 1 << 1,
            Layer::Environment => 1 << 2,
            Layer::Prop => 1 << 3,
            Layer::Tool => 1 << 4,
        })
    }

    /// Groups this layer collides with.
    ///
    /// `player_collision` lets player capsules collide with each other.
    pub const fn mask(self, player_collision: bool) -> LayerMask {
        let camera = Layer::Camera.group().0;
        let player = Layer::Player.group().0;
        let environment = Layer::Environment.group().0;
        let prop = Layer::Prop.group().0;
        let tool = Layer::Tool.group().0;
        LayerMask(match self {
            Layer::Camera => environment,
            Layer::Player => {
                if player_collision {
                    environment | prop | player
                } else {
                    environment | prop
                }
            }
            Layer::Environment => camera | player | environment | prop | tool,
            Layer::Prop => environment | prop,
            Layer::Tool => environment | prop,
        })
    }

    /// Whether shapes on `self` and `other` generate contacts
    pub const fn interacts_with(self, other: Layer, player_collision: bool) -> bool {
        self.mask(player_collision).contains(other.group())
            && other.mask(player_collision).contains(self.group())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_are_distinct_bits() {
        let mut seen = 0u32;
        for layer in Layer::ALL {
            let bits = layer.group().bits();
            assert_eq!(bits.count_ones(), 1);
            assert_eq!(seen & bits, 0);
            seen |= bits;
        }
    }

    #[test]
    fn player_collision_is_opt_in() {
        assert!(!Layer::Player.interacts_with(Layer::Player, false));
        assert!(Layer::Player.interacts_with(Layer::Player, true));
        assert!(Layer::Player.interacts_with(Layer::Environment, false));
    }

    #[test]
    fn ground_mask_excludes_players() {
        assert!(LayerMask::GROUND.contains(Layer::Environment.into()));
        assert!(LayerMask::GROUND.contains(Layer::Prop.into()));
        assert!(!LayerMask::GROUND.contains(Layer::Player.into()));
    }

    #[test]
    fn camera_only_hits_environment() {
        assert!(Layer::Camera.interacts_with(Layer::Environment, false));
        assert!(!Layer::Camera.interacts_with(Layer::Prop, false));
    }
}
