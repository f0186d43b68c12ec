//! Persona catalogue: selectable roles that govern model routing.

use serde::{Deserialize, Serialize};

/// Role key of the image-generation persona. While it is active, every
/// provider except google is treated as restricted.
pub const IMAGE_PERSONA_KEY: &str = "ai_illustrator";

/// A selectable role/system-prompt configuration, keyed by `role_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub role_key: String,
    pub role_name: String,
}

pub fn is_image_persona(role_key: &str) -> bool {
    role_key == IMAGE_PERSONA_KEY
}

/// Pick the persona to select out of a visibility list: the current one when
/// still visible, else the first entry. An empty list selects nothing.
pub fn resolve_selection<'a>(personas: &'a [Persona], current: &str) -> Option<&'a Persona> {
    personas
        .iter()
        .find(|p| p.role_key == current)
        .or_else(|| personas.first())
}
