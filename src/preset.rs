//! Buckets arbitrary size requests into a small set of cacheable targets.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePreset {
    pub key: &'static str,
    pub max_width: u32,
    pub max_height: u32,
}

impl SizePreset {
    const fn new(key: &'static str, max_width: u32, max_height: u32) -> Self {
        Self {
            key,
            max_width,
            max_height,
        }
    }

    fn longest_edge(&self) -> u32 {
        self.max_width.max(self.max_height)
    }
}

pub const THUMBNAIL: &str = "thumbnail";
pub const THUMBNAIL_MAX_EDGE: u32 = 480;

/// Ordered: nearest-match ties go to the earlier entry.
pub const PRESETS: &[SizePreset] = &[
    SizePreset::new(THUMBNAIL, 480, 480),
    SizePreset::new("small", 1280, 720),
    SizePreset::new("medium", 1920, 1080),
    SizePreset::new("large", 2560, 1440),
    SizePreset::new("4k", 3840, 2160),
];

pub fn select_target(
    max_width: Option<u32>,
    max_height: Option<u32>,
    mode: Option<&str>,
) -> Option<(u32, u32)> {
    select_target_in(PRESETS, max_width, max_height, mode)
}

/// Resolves a request to target dimensions, or `None` for the original.
pub fn select_target_in(
    presets: &[SizePreset],
    max_width: Option<u32>,
    max_height: Option<u32>,
    mode: Option<&str>,
) -> Option<(u32, u32)> {
    let mode = mode.map(str::trim).filter(|m| !m.is_empty());

    let chosen = match mode {
        Some(m) if m.eq_ignore_ascii_case("original") || m.eq_ignore_ascii_case("orig") => {
            return None;
        }
        Some(m) => presets.iter().find(|p| p.key.eq_ignore_ascii_case(m)),
        None => None,
    };

    let chosen = match chosen {
        Some(preset) => preset,
        None => {
            let requested = max_width.unwrap_or(0).max(max_height.unwrap_or(0));
            if requested == 0 {
                return None;
            }
            // min_by_key keeps the first of equal keys
            presets
                .iter()
                .min_by_key(|p| p.longest_edge().abs_diff(requested))?
        }
    };

    let (mut width, mut height) = (chosen.max_width, chosen.max_height);
    if chosen.key == THUMBNAIL {
        width = width.min(THUMBNAIL_MAX_EDGE);
        height = height.min(THUMBNAIL_MAX_EDGE);
    }
    Some((width, height))
}
