//! Coordination core of an interactive 3D scene editor.
//!
//! Components talk through the [`bus::EventBus`]; the [`editor::Editor`]
//! wires them together over one [`editor::EditorContext`].

pub mod assets;
pub mod bus;
pub mod config;
pub mod controls;
pub mod editor;
pub mod materials;
pub mod render;
pub mod scene;
pub mod ui;

pub use config::EditorConfig;
pub use editor::{Editor, EditorContext};
