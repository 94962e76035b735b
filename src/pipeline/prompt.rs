//! Prompt construction - pure mapping from variant options to prompt text

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::pipeline::{Angle, Background, Lighting};

/// Fixed prefix describing the subject class
const SUBJECT_PREFIX: &str = "photorealistic professional vehicle wrap render";

/// Fallback when the caller provided no design description
const DEFAULT_DESCRIPTION: &str = "custom vinyl wrap design with bold graphics";

/// Fixed quality suffix appended to every prompt
const QUALITY_SUFFIX: &str =
    "DSLR photography, ultra sharp, 8k resolution, commercial automotive photography";

static LIGHTING_PHRASES: Lazy<HashMap<Lighting, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            Lighting::Showroom,
            "white studio background, perfect three-point studio lighting, clean seamless white floor, showroom quality photography",
        ),
        (
            Lighting::Daylight,
            "outdoors on a clear sunny day, natural bright sunlight, vivid blue sky with scattered clouds",
        ),
        (
            Lighting::Overcast,
            "outdoors overcast day, soft diffuse even lighting, no harsh shadows, diffused natural light",
        ),
        (
            Lighting::GoldenHour,
            "golden hour sunset, warm orange and amber light, long dramatic shadows, magic hour photography",
        ),
        (
            Lighting::Night,
            "night scene, vehicle headlights and taillights glowing, dramatic dark environment, moody night photography",
        ),
    ])
});

static BACKGROUND_PHRASES: Lazy<HashMap<Background, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            Background::Studio,
            "seamless white studio backdrop, reflective polished floor",
        ),
        (
            Background::CityStreet,
            "urban city street, downtown buildings, road surface, city environment",
        ),
        (
            Background::Dealership,
            "car dealership exterior lot, automotive showroom setting",
        ),
        (Background::Custom, ""),
    ])
});

static ANGLE_PHRASES: Lazy<HashMap<Angle, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (Angle::Original, ""),
        (Angle::Front, "front view facing camera, head-on angle"),
        (
            Angle::Side,
            "driver side profile view, full broadside angle, lateral view",
        ),
        (Angle::Rear, "rear view, back of vehicle facing camera"),
        (
            Angle::ThreeQuarter,
            "dynamic three-quarter front angle, 45-degree perspective",
        ),
    ])
});

/// Options for one prompt
#[derive(Debug, Clone, Default)]
pub struct PromptOptions {
    pub description: Option<String>,
    pub lighting: Lighting,
    pub background: Background,
    pub angle: Angle,
    /// Free-text clause replacing the background phrase when `background` is
    /// [`Background::Custom`]
    pub custom_background: Option<String>,
}

/// Pure prompt builder over static phrase tables.
///
/// Tables are injected at construction so tests can swap them; the default
/// instance carries the canonical phrases.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    lighting: &'static HashMap<Lighting, &'static str>,
    backgrounds: &'static HashMap<Background, &'static str>,
    angles: &'static HashMap<Angle, &'static str>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            lighting: &LIGHTING_PHRASES,
            backgrounds: &BACKGROUND_PHRASES,
            angles: &ANGLE_PHRASES,
        }
    }

    /// Build the prompt: subject, angle, lighting, background, quality suffix.
    /// Empty clauses are dropped; the rest joined with a stable separator.
    pub fn build(&self, opts: &PromptOptions) -> String {
        let description = opts
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(DEFAULT_DESCRIPTION);

        let background_clause = match (opts.background, opts.custom_background.as_deref()) {
            (Background::Custom, Some(custom)) if !custom.trim().is_empty() => custom,
            _ => self
                .backgrounds
                .get(&opts.background)
                .copied()
                .unwrap_or_default(),
        };

        [
            SUBJECT_PREFIX,
            description,
            self.angles.get(&opts.angle).copied().unwrap_or_default(),
            self.lighting
                .get(&opts.lighting)
                .copied()
                .unwrap_or(LIGHTING_PHRASES[&Lighting::Showroom]),
            background_clause,
            QUALITY_SUFFIX,
        ]
        .iter()
        .filter(|clause| !clause.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
