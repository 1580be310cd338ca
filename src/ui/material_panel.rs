use super::{validate_numeric_input, NumericRange};
use crate::assets::texture::is_texture_file;
use crate::bus::{subscribe_weak, EditorEvent, EventBus, Subscriptions, Topic};
use crate::materials::{MaterialSnapshot, TextureSlot};
use crate::scene::Color;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

const OPACITY_RANGE: NumericRange = NumericRange::new(0.0, 1.0);

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialFields {
    pub color: String,
    pub opacity: f32,
    /// Opacity formatted with two decimals.
    pub opacity_display: String,
    pub transparent: bool,
    pub diffuse_enabled: bool,
    pub normal_enabled: bool,
}

impl Default for MaterialFields {
    fn default() -> Self {
        Self {
            color: Color::WHITE.to_hex_string(),
            opacity: 1.0,
            opacity_display: "1.00".to_string(),
            transparent: false,
            diffuse_enabled: false,
            normal_enabled: false,
        }
    }
}

pub struct MaterialPanel {
    bus: Rc<EventBus>,
    fields: RefCell<MaterialFields>,
    last_error: RefCell<Option<String>>,
    subscriptions: RefCell<Subscriptions>,
}

impl MaterialPanel {
    pub fn new(bus: Rc<EventBus>) -> Rc<Self> {
        let panel = Rc::new(Self {
            bus,
            fields: RefCell::new(MaterialFields::default()),
            last_error: RefCell::new(None),
            subscriptions: RefCell::new(Subscriptions::default()),
        });
        let id = subscribe_weak(&panel.bus, Topic::MaterialUpdated, &panel, |this, event| {
            if let EditorEvent::MaterialUpdated(snapshot) = event {
                this.mirror(snapshot);
            }
            Ok(())
        });
        panel
            .subscriptions
            .borrow_mut()
            .push(Topic::MaterialUpdated, id);
        panel
    }

    pub fn fields(&self) -> MaterialFields {
        self.fields.borrow().clone()
    }

    fn mirror(&self, snapshot: &MaterialSnapshot) {
        let mut fields = self.fields.borrow_mut();
        fields.color = snapshot.color.clone();
        fields.opacity = snapshot.opacity;
        fields.opacity_display = format!("{:.2}", snapshot.opacity);
        fields.transparent = snapshot.transparent;
        fields.diffuse_enabled = snapshot.has_diffuse_map;
        fields.normal_enabled = snapshot.has_normal_map;
    }

    /// Publishes only when `text` is a valid `#rrggbb` color.
    pub fn set_color(&self, text: &str) -> bool {
        let Some(color) = Color::parse_hex(text) else {
            log::error!("Invalid color '{}'", text);
            return false;
        };
        self.fields.borrow_mut().color = color.to_hex_string();
        self.bus.broadcast(EditorEvent::UiMaterialColorChange(color));
        true
    }

    pub fn set_opacity(&self, text: &str) -> f32 {
        let opacity = validate_numeric_input(text, 1.0, OPACITY_RANGE).value;
        {
            let mut fields = self.fields.borrow_mut();
            fields.opacity = opacity;
            fields.opacity_display = format!("{:.2}", opacity);
        }
        self.bus.broadcast(EditorEvent::UiMaterialOpacityChange(opacity));
        opacity
    }

    pub fn set_transparent(&self, transparent: bool) {
        self.fields.borrow_mut().transparent = transparent;
        self.bus
            .broadcast(EditorEvent::UiMaterialTransparentChange(transparent));
    }

    pub fn toggle_map(&self, slot: TextureSlot, enabled: bool) {
        let event = {
            let mut fields = self.fields.borrow_mut();
            match slot {
                TextureSlot::Diffuse => {
                    fields.diffuse_enabled = enabled;
                    EditorEvent::UiMaterialDiffuseToggle(enabled)
                }
                TextureSlot::Normal => {
                    fields.normal_enabled = enabled;
                    EditorEvent::UiMaterialNormalToggle(enabled)
                }
            }
        };
        self.bus.broadcast(event);
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    /// Publishes only image files. Anything else is logged and kept as the
    /// panel's last error.
    pub fn choose_file(&self, slot: TextureSlot, path: PathBuf) -> bool {
        if !is_texture_file(&path) {
            let message = format!("{} is not a supported {} texture", path.display(), slot);
            log::error!("{}", message);
            *self.last_error.borrow_mut() = Some(message);
            return false;
        }
        self.last_error.borrow_mut().take();
        let event = match slot {
            TextureSlot::Diffuse => EditorEvent::UiMaterialDiffuseFile(path),
            TextureSlot::Normal => EditorEvent::UiMaterialNormalFile(path),
        };
        self.bus.broadcast(event);
        true
    }

    pub fn dispose(&self) {
        self.subscriptions.borrow_mut().release(&self.bus);
    }
}
