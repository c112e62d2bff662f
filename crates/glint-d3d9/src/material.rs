//! Phong material state: colors plus non-owning texture map slots.

use glint_gpu::TextureId;
use tracing::error;

/// The four texture map slots, in their fixed boundary order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapKind {
    Diffuse,
    Specular,
    Bump,
    SelfIllumination,
}

impl MapKind {
    pub const COUNT: usize = 4;

    pub fn from_index(index: i32) -> Option<MapKind> {
        match index {
            0 => Some(MapKind::Diffuse),
            1 => Some(MapKind::Specular),
            2 => Some(MapKind::Bump),
            3 => Some(MapKind::SelfIllumination),
            _ => None,
        }
    }
}

/// Map slots are non-owning: texture lifetime belongs to the caller's
/// resource layer, a material only remembers which texture to sample.
pub struct PhongMaterial {
    diffuse: [f32; 4],
    specular: [f32; 4],
    specular_set: bool,
    maps: [Option<TextureId>; MapKind::COUNT],
}

impl Default for PhongMaterial {
    fn default() -> Self {
        Self {
            diffuse: [0.0; 4],
            // Shader default when no specular color was set: white with
            // power 32.
            specular: [1.0, 1.0, 1.0, 32.0],
            specular_set: false,
            maps: [None; MapKind::COUNT],
        }
    }
}

impl PhongMaterial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_diffuse_color(&mut self, color: [f32; 4]) {
        self.diffuse = color;
    }

    pub fn diffuse_color(&self) -> [f32; 4] {
        self.diffuse
    }

    /// `set = false` reverts to the default specular and marks it unset.
    pub fn set_specular_color(&mut self, set: bool, color: [f32; 4]) {
        self.specular_set = set;
        if set {
            self.specular = color;
        } else {
            self.specular = [1.0, 1.0, 1.0, 32.0];
        }
    }

    pub fn specular_color(&self) -> [f32; 4] {
        self.specular
    }

    pub fn has_specular_color(&self) -> bool {
        self.specular_set
    }

    pub fn set_map(&mut self, kind: MapKind, texture: Option<TextureId>) {
        self.maps[kind as usize] = texture;
    }

    pub fn map(&self, kind: MapKind) -> Option<TextureId> {
        self.maps[kind as usize]
    }

    /// Integer-indexed surface for the marshaling layer; an out-of-range
    /// index is logged and ignored.
    pub fn set_map_index(&mut self, index: i32, texture: Option<TextureId>) {
        match MapKind::from_index(index) {
            Some(kind) => self.set_map(kind, texture),
            None => error!(index, "material map index out of range"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_the_shader_contract() {
        let material = PhongMaterial::new();
        assert_eq!(material.diffuse_color(), [0.0; 4]);
        assert_eq!(material.specular_color(), [1.0, 1.0, 1.0, 32.0]);
        assert!(!material.has_specular_color());
        for index in 0..MapKind::COUNT as i32 {
            assert_eq!(material.map(MapKind::from_index(index).unwrap()), None);
        }
    }

    #[test]
    fn unsetting_specular_restores_the_default() {
        let mut material = PhongMaterial::new();
        material.set_specular_color(true, [0.2, 0.3, 0.4, 8.0]);
        assert!(material.has_specular_color());
        assert_eq!(material.specular_color(), [0.2, 0.3, 0.4, 8.0]);

        material.set_specular_color(false, [9.0; 4]);
        assert!(!material.has_specular_color());
        assert_eq!(material.specular_color(), [1.0, 1.0, 1.0, 32.0]);
    }

    #[test]
    fn out_of_range_map_index_is_ignored() {
        let mut material = PhongMaterial::new();
        material.set_map_index(1, Some(TextureId(5)));
        material.set_map_index(4, Some(TextureId(6)));
        material.set_map_index(-1, Some(TextureId(7)));

        assert_eq!(material.map(MapKind::Specular), Some(TextureId(5)));
        assert_eq!(material.map(MapKind::Diffuse), None);
        assert_eq!(material.map(MapKind::Bump), None);
        assert_eq!(material.map(MapKind::SelfIllumination), None);
    }
}
