use crate::assets::import::{ImportError, ModelFormat};
use crate::bus::{EditorEvent, EventBus};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// File picker for models. Rejects unknown extensions before anything is published.
pub struct ImportPanel {
    bus: Rc<EventBus>,
    last_error: RefCell<Option<String>>,
}

impl ImportPanel {
    pub fn new(bus: Rc<EventBus>) -> Rc<Self> {
        Rc::new(Self {
            bus,
            last_error: RefCell::new(None),
        })
    }

    /// Extensions the picker filters on.
    pub fn accepted_extensions(&self) -> &'static [&'static str] {
        &ModelFormat::EXTENSIONS
    }

    pub fn choose_file(&self, path: &Path) -> Result<ModelFormat, ImportError> {
        match ModelFormat::from_path(path) {
            Ok(format) => {
                self.last_error.borrow_mut().take();
                self.bus
                    .broadcast(EditorEvent::UiModelImport(path.to_path_buf()));
                Ok(format)
            }
            Err(err) => {
                log::error!("{}", err);
                *self.last_error.borrow_mut() = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Message to show the user for the last rejected file.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub fn dispose(&self) {}
}
