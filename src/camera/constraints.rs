use crate::config::{CameraConfig, FacingMode, ResolutionRange};
use std::fmt;

/// Which constraint set produced a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintProfile {
    Preferred,
    Fallback,
}

impl fmt::Display for ConstraintProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintProfile::Preferred => write!(f, "preferred"),
            ConstraintProfile::Fallback => write!(f, "fallback"),
        }
    }
}

/// Media request constraints. `None` leaves a property unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConstraintSet {
    pub facing_mode: Option<FacingMode>,
    pub width: Option<ResolutionRange>,
    pub height: Option<ResolutionRange>,
}

impl ConstraintSet {
    /// Front-facing camera within the configured resolution range
    pub fn preferred(config: &CameraConfig) -> Self {
        Self {
            facing_mode: Some(config.facing_mode),
            width: Some(config.width),
            height: Some(config.height),
        }
    }

    /// Any camera at any resolution
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn is_minimal(&self) -> bool {
        self.facing_mode.is_none() && self.width.is_none() && self.height.is_none()
    }

    /// Name of the first constraint a device with these properties violates
    pub fn violation(&self, facing: FacingMode, width: u32, height: u32) -> Option<&'static str> {
        if matches!(self.facing_mode, Some(wanted) if wanted != facing) {
            return Some("facingMode");
        }
        if matches!(self.width, Some(range) if width < range.min || width > range.max) {
            return Some("width");
        }
        if matches!(self.height, Some(range) if height < range.min || height > range.max) {
            return Some("height");
        }
        None
    }
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_minimal() {
            return write!(f, "any camera");
        }
        let mut parts = Vec::new();
        if let Some(facing) = self.facing_mode {
            parts.push(format!("facing={:?}", facing).to_lowercase());
        }
        if let Some(w) = self.width {
            parts.push(format!("width={}..{} (ideal {})", w.min, w.max, w.ideal));
        }
        if let Some(h) = self.height {
            parts.push(format!("height={}..{} (ideal {})", h.min, h.max, h.ideal));
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_set_follows_config() {
        let config = CameraConfig::default();
        let set = ConstraintSet::preferred(&config);
        assert_eq!(set.facing_mode, Some(FacingMode::User));
        assert!(!set.is_minimal());
        assert_eq!(set.violation(FacingMode::User, 1280, 720), None);
        assert_eq!(set.violation(FacingMode::Environment, 1280, 720), Some("facingMode"));
        assert_eq!(set.violation(FacingMode::User, 320, 720), Some("width"));
        assert_eq!(set.violation(FacingMode::User, 1280, 2000), Some("height"));
    }

    #[test]
    fn test_minimal_set_accepts_anything() {
        let set = ConstraintSet::minimal();
        assert!(set.is_minimal());
        assert_eq!(set.violation(FacingMode::Environment, 1, 1), None);
        assert_eq!(set.to_string(), "any camera");
    }
}
