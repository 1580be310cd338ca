//! Headless panel models.
//!
//! Each panel holds the form state a toolkit would render, turns raw user
//! input into validated `ui.*` events, and mirrors broadcast state back into
//! its fields. Invalid input is corrected here so the core only ever sees
//! well-formed payloads.

pub mod environment_panel;
pub mod import_panel;
pub mod loading_screen;
pub mod material_panel;
pub mod object_panel;
pub mod tabs;

pub use environment_panel::EnvironmentPanel;
pub use import_panel::ImportPanel;
pub use loading_screen::LoadingScreen;
pub use material_panel::{MaterialFields, MaterialPanel};
pub use object_panel::{ObjectFields, ObjectPanel};
pub use tabs::{Tab, Tabs};

use crate::editor::EditorContext;
use std::rc::Rc;

/// Inclusive bounds of a numeric field. Unbounded ends are infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub min: f32,
    pub max: f32,
}

impl NumericRange {
    pub const UNBOUNDED: Self = Self {
        min: f32::NEG_INFINITY,
        max: f32::INFINITY,
    };

    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedInput {
    pub value: f32,
    /// The raw text was replaced by a default or clamped.
    pub adjusted: bool,
}

/// Parse `text` the way a browser number field does and constrain it to `range`.
///
/// A leading numeric prefix is accepted (`"12px"` reads as 12). Text with no
/// number, or a non-finite one, falls back to `default`.
pub fn validate_numeric_input(text: &str, default: f32, range: NumericRange) -> ValidatedInput {
    let (value, mut adjusted) = match parse_float_prefix(text) {
        Some(value) if value.is_finite() => (value, false),
        _ => (default, true),
    };
    let clamped = value.max(range.min).min(range.max);
    if clamped != value {
        adjusted = true;
    }
    ValidatedInput {
        value: clamped,
        adjusted,
    }
}

fn parse_float_prefix(text: &str) -> Option<f32> {
    let trimmed = text.trim_start();
    let end = trimmed
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        .map(|(index, c)| index + c.len_utf8())
        .last()?;
    (1..=end)
        .rev()
        .find_map(|len| trimmed[..len].parse::<f32>().ok())
}

/// Every panel, created and torn down together.
pub struct UiPanels {
    pub loading: Rc<LoadingScreen>,
    pub object: Rc<ObjectPanel>,
    pub material: Rc<MaterialPanel>,
    pub tabs: Rc<Tabs>,
    pub import: Rc<ImportPanel>,
    pub environment: Rc<EnvironmentPanel>,
}

impl UiPanels {
    pub fn new(ctx: &EditorContext) -> Self {
        Self {
            loading: LoadingScreen::new(Rc::clone(&ctx.bus), !ctx.loading.is_idle()),
            object: ObjectPanel::new(Rc::clone(&ctx.bus)),
            material: MaterialPanel::new(Rc::clone(&ctx.bus)),
            tabs: Tabs::new(Rc::clone(&ctx.bus)),
            import: ImportPanel::new(Rc::clone(&ctx.bus)),
            environment: EnvironmentPanel::new(Rc::clone(&ctx.bus), &ctx.config.environment),
        }
    }

    pub fn dispose(&self) {
        self.environment.dispose();
        self.import.dispose();
        self.tabs.dispose();
        self.material.dispose();
        self.object.dispose();
        self.loading.dispose();
    }
}
