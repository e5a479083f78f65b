//! Node handles.
//!
//! A node is addressed by its record index in the storage file. Index -1 is
//! the sentinel: it stands for "no child" and "no parent", has no record
//! behind it and always reads as Black.

/// Node color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Black,
}

impl Color {
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Red => 1,
            Self::Black => 0,
        }
    }

    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Red),
            0 => Some(Self::Black),
            _ => None,
        }
    }
}

/// A record index used in place of a pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(i32);

impl NodeRef {
    /// The sentinel.
    pub const NIL: Self = Self(-1);

    #[must_use]
    pub const fn new(index: i32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> i32 {
        self.0
    }

    /// True for the sentinel (and any other negative index).
    #[must_use]
    pub const fn is_nil(self) -> bool {
        self.0 < 0
    }

    /// The slot number, or `None` for the sentinel.
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // Guarded by the negativity check
    pub const fn slot(self) -> Option<u32> {
        if self.is_nil() {
            None
        } else {
            Some(self.0 as u32)
        }
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::NIL
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_nil() {
            write!(f, "nil")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel() {
        assert!(NodeRef::NIL.is_nil());
        assert_eq!(NodeRef::NIL.slot(), None);
        assert_eq!(NodeRef::default(), NodeRef::NIL);
        assert!(NodeRef::new(-7).is_nil());
        assert_eq!(NodeRef::new(5).slot(), Some(5));
    }

    #[test]
    fn test_color_bytes() {
        assert_eq!(Color::from_byte(Color::Red.to_byte()), Some(Color::Red));
        assert_eq!(Color::from_byte(Color::Black.to_byte()), Some(Color::Black));
        assert_eq!(Color::from_byte(2), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeRef::NIL.to_string(), "nil");
        assert_eq!(NodeRef::new(3).to_string(), "#3");
    }
}
