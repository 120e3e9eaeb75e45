/// Per-voxel clustering state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i8)]
pub enum Label {
    /// Not yet classified.
    #[default]
    Unvisited = 0,
    /// Belongs to a cluster.
    Member = 1,
    /// Excluded from every cluster.
    Noise = -1,
}

impl Label {
    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Label::Unvisited),
            1 => Some(Label::Member),
            -1 => Some(Label::Noise),
            _ => None,
        }
    }

    pub fn is_visited(self) -> bool {
        self != Label::Unvisited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(Label::Unvisited.code(), 0);
        assert_eq!(Label::Member.code(), 1);
        assert_eq!(Label::Noise.code(), -1);
        for l in [Label::Unvisited, Label::Member, Label::Noise] {
            assert_eq!(Label::from_code(l.code()), Some(l));
        }
        assert_eq!(Label::from_code(2), None);
    }

    #[test]
    fn test_default_is_unvisited() {
        assert_eq!(Label::default(), Label::Unvisited);
        assert!(!Label::default().is_visited());
        assert!(Label::Noise.is_visited());
    }
}
