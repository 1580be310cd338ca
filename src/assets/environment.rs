//! Environment map catalog.
//!
//! Holds every loaded equirectangular map by name. One map at most is active
//! (it lights the scene); whether it is also shown as the background is a
//! separate flag, and both are only ever changed together through
//! [`EnvMapsManager::set_environment_map`] or, for the flag alone, through
//! [`EnvMapsManager::set_background_visible`] once a map is active.

use super::texture::decode_environment;
use super::Generation;
use crate::bus::{subscribe_weak, EditorEvent, Subscriptions, Topic};
use crate::editor::EditorContext;
use crate::render::{Background, TextureId};
use crate::scene::Color;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Default)]
struct EnvState {
    maps: HashMap<String, TextureId>,
    loading: HashSet<String>,
    active: Option<String>,
    background_visible: bool,
    /// Selection made while its map was still loading.
    deferred: Option<(String, bool)>,
}

pub struct EnvMapsManager {
    ctx: EditorContext,
    generation: Generation,
    background_off: Color,
    state: RefCell<EnvState>,
    subscriptions: RefCell<Subscriptions>,
    disposed: Cell<bool>,
}

impl EnvMapsManager {
    /// Subscribes to the environment panel and starts loading the configured catalog.
    pub fn new(ctx: EditorContext) -> Rc<Self> {
        let env_config = ctx.config.environment.clone();
        let background_off =
            Color::parse_hex(&env_config.background_off).unwrap_or_else(|| Color::from_hex(0x2b2d31));
        let manager = Rc::new(Self {
            ctx,
            generation: Generation::new(),
            background_off,
            state: RefCell::new(EnvState::default()),
            subscriptions: RefCell::new(Subscriptions::default()),
            disposed: Cell::new(false),
        });

        {
            let bus = &manager.ctx.bus;
            let mut subs = manager.subscriptions.borrow_mut();
            subs.push(
                Topic::UiEnvironmentMapSelected,
                subscribe_weak(bus, Topic::UiEnvironmentMapSelected, &manager, |this, event| {
                    if let EditorEvent::UiEnvironmentMapSelected(selection) = event {
                        this.set_environment_map(&selection.name, selection.background_visible);
                    }
                    Ok(())
                }),
            );
            subs.push(
                Topic::UiEnvironmentBackgroundToggle,
                subscribe_weak(bus, Topic::UiEnvironmentBackgroundToggle, &manager, |this, event| {
                    if let EditorEvent::UiEnvironmentBackgroundToggle(visible) = event {
                        this.set_background_visible(*visible);
                    }
                    Ok(())
                }),
            );
        }

        if !env_config.default_map.is_empty() {
            manager.state.borrow_mut().deferred =
                Some((env_config.default_map.clone(), env_config.background_visible));
        }
        for entry in &env_config.catalog {
            let path = manager.ctx.config.resolve_asset(&entry.path);
            manager.load_environment_map(&entry.name, path);
        }
        manager
    }

    /// Queue a catalog entry. Returns false if `name` is already loaded or loading.
    pub fn load_environment_map(self: &Rc<Self>, name: &str, path: PathBuf) -> bool {
        if self.disposed.get() {
            return false;
        }
        {
            let mut state = self.state.borrow_mut();
            if state.maps.contains_key(name) || !state.loading.insert(name.to_string()) {
                return false;
            }
        }
        let weak = Rc::downgrade(self);
        let map_name = name.to_string();
        let label = format!("environment {}", name);
        let queued = self.ctx.loading.request(
            label,
            self.generation.token(),
            move || decode_environment(&path),
            move |result| {
                if let Some(this) = weak.upgrade() {
                    this.finish_load(&map_name, result);
                }
            },
        );
        if queued.is_none() {
            self.state.borrow_mut().loading.remove(name);
        }
        queued.is_some()
    }

    fn finish_load(&self, name: &str, result: Result<crate::render::TextureData, super::LoadError>) {
        self.state.borrow_mut().loading.remove(name);
        let data = match result {
            Ok(data) => data,
            Err(err) => {
                log::warn!("Environment map '{}' unavailable: {}", name, err);
                self.drop_deferred(name);
                return;
            }
        };
        let texture = match self.ctx.registry.upload_texture(&data) {
            Ok(texture) => texture,
            Err(err) => {
                log::warn!("Failed to upload environment map '{}': {}", name, err);
                self.drop_deferred(name);
                return;
            }
        };
        log::info!("Environment map '{}' loaded ({}x{})", name, data.width, data.height);
        let deferred = {
            let mut state = self.state.borrow_mut();
            state.maps.insert(name.to_string(), texture);
            let waiting = matches!(&state.deferred, Some((pending, _)) if pending == name);
            if waiting {
                state.deferred.take()
            } else {
                None
            }
        };
        if let Some((name, visible)) = deferred {
            self.set_environment_map(&name, visible);
        }
    }

    fn drop_deferred(&self, name: &str) {
        let mut state = self.state.borrow_mut();
        if matches!(&state.deferred, Some((pending, _)) if pending == name) {
            state.deferred = None;
        }
    }

    /// Activate `name` for lighting and, when `background_visible`, as the background.
    pub fn set_environment_map(&self, name: &str, background_visible: bool) -> bool {
        let texture = {
            let mut state = self.state.borrow_mut();
            match state.maps.get(name).copied() {
                Some(texture) => {
                    state.deferred = None;
                    state.active = Some(name.to_string());
                    state.background_visible = background_visible;
                    texture
                }
                None if state.loading.contains(name) => {
                    log::info!("Environment map '{}' still loading, will apply when ready", name);
                    state.deferred = Some((name.to_string(), background_visible));
                    return false;
                }
                None => {
                    log::error!("Environment map '{}' not found", name);
                    return false;
                }
            }
        };

        let registry = &self.ctx.registry;
        registry.set_environment(Some(texture));
        if background_visible {
            registry.set_background(Background::Texture(texture));
        } else if matches!(registry.background(), Background::Texture(_)) {
            registry.set_background(Background::Color(self.background_off));
        }
        log::info!("Environment map '{}' active", name);
        true
    }

    pub fn set_background_visible(&self, visible: bool) -> bool {
        let texture = {
            let mut state = self.state.borrow_mut();
            let Some(texture) = state.active.as_ref().and_then(|name| state.maps.get(name)).copied()
            else {
                log::error!("No environment map selected");
                return false;
            };
            state.background_visible = visible;
            texture
        };
        let background = if visible {
            Background::Texture(texture)
        } else {
            Background::Color(self.background_off)
        };
        self.ctx.registry.set_background(background);
        true
    }

    pub fn active_map(&self) -> Option<String> {
        self.state.borrow().active.clone()
    }

    pub fn background_visible(&self) -> bool {
        self.state.borrow().background_visible
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.state.borrow().maps.contains_key(name)
    }

    pub fn is_loading(&self, name: &str) -> bool {
        self.state.borrow().loading.contains(name)
    }

    /// Releases every loaded map and stops listening. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.generation.advance();
        self.subscriptions.borrow_mut().release(&self.ctx.bus);

        let state = std::mem::take(&mut *self.state.borrow_mut());
        let registry = &self.ctx.registry;
        if let Background::Texture(texture) = registry.background() {
            if state.maps.values().any(|id| *id == texture) {
                registry.set_background(Background::Color(self.background_off));
            }
        }
        if registry
            .environment()
            .is_some_and(|texture| state.maps.values().any(|id| *id == texture))
        {
            registry.set_environment(None);
        }
        for texture in state.maps.into_values() {
            registry.release_texture(texture);
        }
    }
}
