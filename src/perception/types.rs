use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The two interchangeable dismiss buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissVariant {
    Back,
    Close,
}

impl DismissVariant {
    pub fn label(self) -> &'static str {
        match self {
            DismissVariant::Back => "back",
            DismissVariant::Close => "close",
        }
    }
}

/// What the arbiter makes of a detected class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "variant", rename_all = "snake_case")]
pub enum Category {
    PrimaryAction,
    SecondaryTarget,
    Dismiss(DismissVariant),
    Ignored,
}

/// Axis-aligned box `(x1, y1, x2, y2)` in frame pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Integer centre, rounded towards the top-left like the pointer math
    /// elsewhere in the crate.
    pub fn center(&self) -> (i32, i32) {
        ((self.x1 + self.x2).div_euclid(2), (self.y1 + self.y2).div_euclid(2))
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub category: Category,
    /// Raw detector class name, kept for logs and the overlay.
    pub class_name: String,
}

impl Detection {
    pub fn new(category: Category, confidence: f32, bbox: BBox) -> Self {
        Self {
            bbox,
            confidence,
            category,
            class_name: default_class_name(category).to_string(),
        }
    }

    pub fn with_class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = name.into();
        self
    }
}

fn default_class_name(category: Category) -> &'static str {
    match category {
        Category::PrimaryAction => "primary",
        Category::SecondaryTarget => "secondary",
        Category::Dismiss(DismissVariant::Back) => "back",
        Category::Dismiss(DismissVariant::Close) => "close",
        Category::Ignored => "other",
    }
}

/// Highest-confidence detection of `category`, if any.
pub fn best_of(detections: &[Detection], category: Category) -> Option<&Detection> {
    detections
        .iter()
        .filter(|d| d.category == category)
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Screen rectangle `(left, top, right, bottom)` in absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl WindowRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// A window with no area cannot be captured.
    pub fn is_capturable(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    pub fn to_absolute(&self, x: i32, y: i32) -> (i32, i32) {
        (self.left + x, self.top + y)
    }
}

/// Opaque identifier of the monitored window plus the last rectangle seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowHandle {
    pub id: u64,
    pub title: String,
    pub rect: Option<WindowRect>,
}

/// Immutable pixel buffer of one captured frame.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<image::RgbaImage>,
}

impl Frame {
    pub fn new(image: image::RgbaImage) -> Self {
        Self { image: Arc::new(image) }
    }

    pub fn image(&self) -> &image::RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
