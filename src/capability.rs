/// A host capability that may or may not exist on this system.
///
/// Detection happens once at startup; the rest of the client only matches on
/// the variant and never probes the host again.
#[derive(Debug)]
pub enum Capability<T> {
    Available(T),
    Unavailable,
}

impl<T> Capability<T> {
    pub fn from_option(handle: Option<T>) -> Self {
        match handle {
            Some(h) => Capability::Available(h),
            None => Capability::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    pub fn as_mut(&mut self) -> Option<&mut T> {
        match self {
            Capability::Available(h) => Some(h),
            Capability::Unavailable => None,
        }
    }

    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Capability::Available(h) => Some(h),
            Capability::Unavailable => None,
        }
    }
}

impl<T> Default for Capability<T> {
    fn default() -> Self {
        Capability::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_from_option() {
        let cap = Capability::from_option(Some(3));
        assert!(cap.is_available());
        assert_eq!(cap.as_ref(), Some(&3));

        let none: Capability<i32> = Capability::from_option(None);
        assert!(!none.is_available());
        assert_eq!(none.as_ref(), None);
    }

    #[test]
    fn test_capability_as_mut() {
        let mut cap = Capability::Available(String::from("a"));
        if let Some(s) = cap.as_mut() {
            s.push('b');
        }
        assert_eq!(cap.as_ref().map(String::as_str), Some("ab"));
    }

    #[test]
    fn test_capability_default_is_unavailable() {
        let cap: Capability<u8> = Capability::default();
        assert!(!cap.is_available());
    }
}
