//! Editor assembly: builds every component over one shared context and tears
//! them down in reverse order.

use crate::assets::environment::EnvMapsManager;
use crate::assets::import::ImportManager;
use crate::assets::LoadingManager;
use crate::bus::EventBus;
use crate::config::EditorConfig;
use crate::controls::SelectionController;
use crate::materials::MaterialManager;
use crate::render::{RenderBackend, RenderError};
use crate::scene::registry::SceneRegistry;
use crate::ui::UiPanels;
use std::cell::Cell;
use std::rc::Rc;

/// Shared services handed to every component.
#[derive(Clone)]
pub struct EditorContext {
    pub bus: Rc<EventBus>,
    pub loading: Rc<LoadingManager>,
    pub registry: Rc<SceneRegistry>,
    pub config: Rc<EditorConfig>,
}

pub struct Editor {
    ctx: EditorContext,
    controls: Rc<SelectionController>,
    materials: Rc<MaterialManager>,
    environment: Rc<EnvMapsManager>,
    import: Rc<ImportManager>,
    panels: UiPanels,
    disposed: Cell<bool>,
}

impl Editor {
    pub fn new(config: EditorConfig, backend: Box<dyn RenderBackend>) -> Self {
        let config = Rc::new(config);
        let bus = Rc::new(EventBus::new());
        let loading = LoadingManager::new(Rc::clone(&bus), &config.loader);
        let registry = SceneRegistry::new(Rc::clone(&bus), &config, backend);
        let ctx = EditorContext {
            bus,
            loading,
            registry,
            config,
        };

        let controls = SelectionController::new(ctx.clone());
        let materials = MaterialManager::new(ctx.clone());
        let environment = EnvMapsManager::new(ctx.clone());
        let import = ImportManager::new(ctx.clone());
        let panels = UiPanels::new(&ctx);
        log::info!(
            "Editor ready: {} object(s), {} bus topic(s)",
            ctx.registry.list_objects().len(),
            ctx.bus.topic_count()
        );

        Self {
            ctx,
            controls,
            materials,
            environment,
            import,
            panels,
            disposed: Cell::new(false),
        }
    }

    pub fn context(&self) -> &EditorContext {
        &self.ctx
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.ctx.bus
    }

    pub fn registry(&self) -> &Rc<SceneRegistry> {
        &self.ctx.registry
    }

    pub fn loading(&self) -> &Rc<LoadingManager> {
        &self.ctx.loading
    }

    pub fn controls(&self) -> &Rc<SelectionController> {
        &self.controls
    }

    pub fn materials(&self) -> &Rc<MaterialManager> {
        &self.materials
    }

    pub fn environment(&self) -> &Rc<EnvMapsManager> {
        &self.environment
    }

    pub fn import(&self) -> &Rc<ImportManager> {
        &self.import
    }

    pub fn panels(&self) -> &UiPanels {
        &self.panels
    }

    /// Delivers finished loads, then renders one frame.
    pub fn frame(&self) -> Result<bool, RenderError> {
        if self.disposed.get() {
            return Ok(false);
        }
        self.ctx.loading.pump();
        self.ctx.registry.tick()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.panels.dispose();
        self.import.dispose();
        self.environment.dispose();
        self.materials.dispose();
        self.controls.dispose();
        self.ctx.registry.dispose();
        self.ctx.loading.dispose();
        log::info!("Editor disposed");
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> EditorContext {
    test_context_with(EditorConfig::headless())
}

/// Inline loading over a headless backend with an 800x800 viewport.
#[cfg(test)]
pub(crate) fn test_context_with(config: EditorConfig) -> EditorContext {
    use crate::render::HeadlessBackend;

    let bus = Rc::new(EventBus::new());
    let loading = LoadingManager::new(Rc::clone(&bus), &config.loader);
    let registry = SceneRegistry::new(Rc::clone(&bus), &config, Box::new(HeadlessBackend::new()));
    registry.resize(800, 800, 1.0);
    EditorContext {
        bus,
        loading,
        registry,
        config: Rc::new(config),
    }
}
