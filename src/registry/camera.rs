//! Per-camera configuration records and the ordered registry.

use super::ConfigError;
use crate::camera::AccessError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest manual focus value accepted (UVC `focus_absolute` range).
pub const FOCUS_MIN: u32 = 0;
/// Highest manual focus value accepted.
pub const FOCUS_MAX: u32 = 127;

/// Frame size in pixels. Written as `"WIDTHxHEIGHT"` in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Creates a resolution. Zero dimensions are rejected by `validate`.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count.
    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// True if this resolution fits inside `other` in both dimensions.
    pub fn fits_within(&self, other: &Resolution) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidResolution(s.to_owned());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

/// Focus mode for a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "FocusRepr", into = "FocusRepr")]
pub enum FocusSetting {
    /// Continuous auto focus.
    #[default]
    Auto,
    /// Fixed manual focus position.
    Manual(u32),
}

impl FocusSetting {
    /// Checks a manual value against `FOCUS_MIN..=FOCUS_MAX`.
    pub fn in_range(&self) -> bool {
        match self {
            Self::Auto => true,
            Self::Manual(v) => (FOCUS_MIN..=FOCUS_MAX).contains(v),
        }
    }
}

impl fmt::Display for FocusSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Manual(v) => write!(f, "manual ({v})"),
        }
    }
}

impl FromStr for FocusSetting {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        s.parse::<u32>()
            .map(Self::Manual)
            .map_err(|_| ConfigError::InvalidFocus(s.to_owned()))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FocusRepr {
    Manual(u32),
    Keyword(String),
}

impl TryFrom<FocusRepr> for FocusSetting {
    type Error = ConfigError;

    fn try_from(value: FocusRepr) -> Result<Self, Self::Error> {
        match value {
            FocusRepr::Manual(v) => Ok(Self::Manual(v)),
            FocusRepr::Keyword(k) => k.parse(),
        }
    }
}

impl From<FocusSetting> for FocusRepr {
    fn from(value: FocusSetting) -> Self {
        match value {
            FocusSetting::Auto => Self::Keyword("auto".to_owned()),
            FocusSetting::Manual(v) => Self::Manual(v),
        }
    }
}

/// Static configuration of one camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Unique key in the registry, also used in output filenames.
    pub id: String,
    /// Device node, e.g. `/dev/video0`.
    #[serde(rename = "device")]
    pub device_path: String,
    /// Still capture resolution.
    pub capture_resolution: Resolution,
    /// Preview stream resolution.
    pub preview_resolution: Resolution,
    /// Focus applied before every capture.
    #[serde(default)]
    pub focus: FocusSetting,
    /// Rotate captured and previewed frames by 180 degrees.
    #[serde(default)]
    pub rotate180: bool,
    /// Human-readable name; defaults to `id`.
    #[serde(default, rename = "name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CameraConfig {
    /// Creates a camera with auto focus, no rotation and no display name.
    pub fn new(
        id: impl Into<String>,
        device_path: impl Into<String>,
        capture_resolution: Resolution,
        preview_resolution: Resolution,
    ) -> Self {
        Self {
            id: id.into(),
            device_path: device_path.into(),
            capture_resolution,
            preview_resolution,
            focus: FocusSetting::Auto,
            rotate180: false,
            name: None,
        }
    }

    /// Sets the focus mode.
    pub fn with_focus(mut self, focus: FocusSetting) -> Self {
        self.focus = focus;
        self
    }

    /// Enables or disables 180-degree rotation.
    pub fn with_rotation(mut self, rotate180: bool) -> Self {
        self.rotate180 = rotate180;
        self
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name shown to the user.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Validates a single camera entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                camera: self.id.clone(),
                field: "id",
            });
        }
        if self.device_path.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                camera: self.id.clone(),
                field: "device",
            });
        }
        for resolution in [self.capture_resolution, self.preview_resolution] {
            if resolution.width == 0 || resolution.height == 0 {
                return Err(ConfigError::InvalidResolution(resolution.to_string()));
            }
        }
        if let FocusSetting::Manual(value) = self.focus {
            if !self.focus.in_range() {
                return Err(ConfigError::FocusOutOfRange {
                    camera: self.id.clone(),
                    value,
                });
            }
        }
        if !self.preview_resolution.fits_within(&self.capture_resolution) {
            tracing::warn!(
                camera = %self.id,
                preview = %self.preview_resolution,
                capture = %self.capture_resolution,
                "Preview resolution exceeds capture resolution"
            );
        }
        Ok(())
    }
}

/// Ordered, validated set of cameras.
///
/// Iteration order is configuration order and is the order of every batch
/// result built from this registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    cameras: Vec<CameraConfig>,
}

impl Registry {
    /// Validates and wraps `cameras`.
    pub fn new(cameras: Vec<CameraConfig>) -> Result<Self, ConfigError> {
        if cameras.is_empty() {
            return Err(ConfigError::Empty);
        }
        for (i, camera) in cameras.iter().enumerate() {
            camera.validate()?;
            if cameras[..i].iter().any(|c| c.id == camera.id) {
                return Err(ConfigError::DuplicateId(camera.id.clone()));
            }
        }
        Ok(Self { cameras })
    }

    /// The two-camera rig this tool was built for.
    pub fn builtin() -> Self {
        Self {
            cameras: builtin_cameras(),
        }
    }

    /// Cameras in configuration order.
    pub fn cameras(&self) -> &[CameraConfig] {
        &self.cameras
    }

    /// Iterates cameras in configuration order.
    pub fn iter(&self) -> std::slice::Iter<'_, CameraConfig> {
        self.cameras.iter()
    }

    /// Number of cameras.
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    /// Always false for a validated registry.
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Looks a camera up by id.
    pub fn get(&self, id: &str) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.id == id)
    }

    /// Keeps only cameras whose device passes `check`.
    ///
    /// Returns the reduced registry and the skipped cameras with their
    /// reasons, or [`ConfigError::NoAccessibleCameras`] if none remain.
    pub fn retain_accessible<F>(
        self,
        check: F,
    ) -> Result<(Self, Vec<(CameraConfig, AccessError)>), ConfigError>
    where
        F: Fn(&str) -> Result<(), AccessError>,
    {
        let mut accessible = Vec::with_capacity(self.cameras.len());
        let mut skipped = Vec::new();
        for camera in self.cameras {
            match check(&camera.device_path) {
                Ok(()) => accessible.push(camera),
                Err(e) => skipped.push((camera, e)),
            }
        }
        if accessible.is_empty() {
            return Err(ConfigError::NoAccessibleCameras(skipped.len()));
        }
        Ok((Self { cameras: accessible }, skipped))
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a CameraConfig;
    type IntoIter = std::slice::Iter<'a, CameraConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub(super) fn builtin_cameras() -> Vec<CameraConfig> {
    vec![
        CameraConfig::new(
            "video0",
            "/dev/video0",
            Resolution::new(8000, 6000),
            Resolution::new(640, 480),
        )
        .with_name("Camera_0"),
        CameraConfig::new(
            "video2",
            "/dev/video2",
            Resolution::new(1920, 1080),
            Resolution::new(640, 480),
        )
        .with_focus(FocusSetting::Manual(120))
        .with_rotation(true)
        .with_name("Camera_2"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(id: &str) -> CameraConfig {
        CameraConfig::new(
            id,
            format!("/dev/{id}"),
            Resolution::new(1920, 1080),
            Resolution::new(640, 480),
        )
    }

    #[test]
    fn test_resolution_parsing() {
        assert_eq!("1920x1080".parse::<Resolution>().unwrap(), Resolution::new(1920, 1080));
        assert_eq!(" 640X480 ".parse::<Resolution>().unwrap(), Resolution::new(640, 480));
        assert!("0x480".parse::<Resolution>().is_err());
        assert!("640".parse::<Resolution>().is_err());
        assert!("axb".parse::<Resolution>().is_err());
        assert_eq!(Resolution::new(8000, 6000).to_string(), "8000x6000");
    }

    #[test]
    fn test_focus_parsing() {
        assert_eq!("auto".parse::<FocusSetting>().unwrap(), FocusSetting::Auto);
        assert_eq!("AUTO".parse::<FocusSetting>().unwrap(), FocusSetting::Auto);
        assert_eq!("120".parse::<FocusSetting>().unwrap(), FocusSetting::Manual(120));
        assert!("near".parse::<FocusSetting>().is_err());
    }

    #[test]
    fn test_builtin_registry_is_valid() {
        let registry = Registry::builtin();
        assert_eq!(Registry::new(registry.cameras().to_vec()).unwrap(), registry);
        let ids: Vec<_> = registry.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["video0", "video2"]);
        assert_eq!(registry.get("video2").unwrap().focus, FocusSetting::Manual(120));
        assert!(registry.get("video2").unwrap().rotate180);
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert!(matches!(Registry::new(Vec::new()), Err(ConfigError::Empty)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = Registry::new(vec![camera("a"), camera("b"), camera("a")]);
        assert!(matches!(result, Err(ConfigError::DuplicateId(id)) if id == "a"));
    }

    #[test]
    fn test_focus_out_of_range_rejected() {
        let cam = camera("a").with_focus(FocusSetting::Manual(FOCUS_MAX + 1));
        assert!(matches!(
            Registry::new(vec![cam]),
            Err(ConfigError::FocusOutOfRange { value: 128, .. })
        ));
    }

    #[test]
    fn test_display_name_defaults_to_id() {
        assert_eq!(camera("left").display_name(), "left");
        assert_eq!(camera("left").with_name("Left").display_name(), "Left");
    }

    #[test]
    fn test_retain_accessible_keeps_order() {
        let registry = Registry::new(vec![camera("a"), camera("b"), camera("c")]).unwrap();
        let (kept, skipped) = registry
            .retain_accessible(|path| {
                if path.ends_with('b') {
                    Err(AccessError::NotFound(path.to_owned()))
                } else {
                    Ok(())
                }
            })
            .unwrap();

        let ids: Vec<_> = kept.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].0.id, "b");
    }

    #[test]
    fn test_retain_accessible_none_left() {
        let registry = Registry::new(vec![camera("a")]).unwrap();
        let result =
            registry.retain_accessible(|path| Err(AccessError::NotFound(path.to_owned())));
        assert!(matches!(result, Err(ConfigError::NoAccessibleCameras(1))));
    }
}
