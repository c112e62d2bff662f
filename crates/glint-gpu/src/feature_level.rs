/// A native API capability tier negotiated at device-creation time.
///
/// Declared in ascending order so that `Ord` compares capability: a driver
/// "knows" a level iff the level is `<=` the highest one it was built against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureLevel {
    L9_1,
    L9_2,
    L9_3,
    L10_0,
    L10_1,
    L11_0,
    L11_1,
}

impl FeatureLevel {
    /// The full device-creation preference list, highest level first.
    pub const DESCENDING: [FeatureLevel; 7] = [
        FeatureLevel::L11_1,
        FeatureLevel::L11_0,
        FeatureLevel::L10_1,
        FeatureLevel::L10_0,
        FeatureLevel::L9_3,
        FeatureLevel::L9_2,
        FeatureLevel::L9_1,
    ];

    /// Fixed per-tier maximum 2-D texture dimension. Levels below 10.0 are not
    /// supported by the capability query surface and report `None`.
    pub fn max_texture_size(self) -> Option<u32> {
        match self {
            FeatureLevel::L11_1 | FeatureLevel::L11_0 => Some(16384),
            FeatureLevel::L10_1 | FeatureLevel::L10_0 => Some(8192),
            _ => None,
        }
    }
}
