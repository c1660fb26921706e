//! Persona registry.
//!
//! The registry is an ordinary object handed to whoever needs it. It starts
//! empty and must be initialized explicitly; lookups before that fail.

use std::collections::BTreeMap;
use std::path::Path;

use include_dir::{include_dir, Dir};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{GenerationError, Result};
use crate::models::Persona;

static BUNDLED_PERSONAS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/personas");

#[derive(Debug, Default)]
pub struct PersonaRegistry {
    personas: RwLock<Option<BTreeMap<String, Persona>>>,
}

fn parse_persona(source: &str, contents: &str) -> Result<Persona> {
    serde_json::from_str(contents).map_err(|e| GenerationError::Persona(format!("{source}: {e}")))
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the personas bundled into the binary.
    pub fn initialize(&self) -> Result<usize> {
        let mut personas = Vec::new();
        for file in BUNDLED_PERSONAS.files() {
            let path = file.path().display().to_string();
            if !path.ends_with(".json") {
                continue;
            }
            let contents = file
                .contents_utf8()
                .ok_or_else(|| GenerationError::Persona(format!("{path}: not valid UTF-8")))?;
            personas.push(parse_persona(&path, contents)?);
        }
        self.initialize_with(personas)
    }

    /// Loads every `*.json` file in `dir`.
    pub fn initialize_from_dir(&self, dir: &Path) -> Result<usize> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| GenerationError::Persona(format!("cannot read {}: {e}", dir.display())))?;
        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut personas = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| GenerationError::Persona(format!("cannot read {}: {e}", path.display())))?;
            personas.push(parse_persona(&path.display().to_string(), &contents)?);
        }
        self.initialize_with(personas)
    }

    /// Replaces the registry contents. Names must be unique and non-empty.
    pub fn initialize_with(&self, personas: Vec<Persona>) -> Result<usize> {
        let mut map = BTreeMap::new();
        for persona in personas {
            if persona.name.trim().is_empty() || persona.locale.trim().is_empty() {
                return Err(GenerationError::Persona(format!(
                    "persona {:?} needs a name and a locale",
                    persona.display_name
                )));
            }
            let name = persona.name.clone();
            if map.insert(name.clone(), persona).is_some() {
                return Err(GenerationError::Persona(format!("duplicate persona name {name:?}")));
            }
        }
        let count = map.len();
        if count == 0 {
            warn!("persona registry initialized with no personas");
        }
        *self.personas.write() = Some(map);
        info!(count, "Persona registry initialized");
        Ok(count)
    }

    pub fn is_initialized(&self) -> bool {
        self.personas.read().is_some()
    }

    fn with_personas<T>(&self, f: impl FnOnce(&BTreeMap<String, Persona>) -> Result<T>) -> Result<T> {
        let guard = self.personas.read();
        let personas = guard
            .as_ref()
            .ok_or_else(|| GenerationError::Persona("registry used before initialize()".into()))?;
        f(personas)
    }

    pub fn get(&self, name: &str) -> Result<Persona> {
        self.with_personas(|personas| {
            personas
                .get(name)
                .cloned()
                .ok_or_else(|| GenerationError::Persona(format!("unknown persona {name:?}")))
        })
    }

    pub fn all(&self) -> Result<Vec<Persona>> {
        self.with_personas(|personas| Ok(personas.values().cloned().collect()))
    }

    /// Records the identifiers the external system issued after the persona authenticated.
    pub fn attach_credentials(&self, name: &str, user_public_id: String, persona_public_id: String) -> Result<()> {
        let mut guard = self.personas.write();
        let personas = guard
            .as_mut()
            .ok_or_else(|| GenerationError::Persona("registry used before initialize()".into()))?;
        let persona = personas
            .get_mut(name)
            .ok_or_else(|| GenerationError::Persona(format!("unknown persona {name:?}")))?;
        persona.user_public_id = Some(user_public_id);
        persona.persona_public_id = Some(persona_public_id);
        Ok(())
    }
}
