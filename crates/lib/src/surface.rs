//! Rendering seam between the controller and a concrete front end.
//!
//! The controller never reaches into a rendering tree; everything it needs
//! from the view goes through this trait. Implementations render to a
//! terminal (the CLI) or record calls (tests).

use crate::directory::SessionListEntry;
use crate::provider::Provider;
use crate::transcript::Turn;

/// Ephemeral notice shown while a submission is in flight. Guaranteed to be
/// cleared before any terminal turn of the submission is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Staged attachments are being uploaded and analyzed.
    Uploading { count: usize },
    /// The assistant is composing a reply.
    Thinking,
}

/// What a front end must be able to render.
pub trait Surface: Send {
    /// Append a turn to the transcript.
    fn render_turn(&mut self, turn: &Turn);

    /// Show an ephemeral placeholder, replacing any previous one.
    fn show_placeholder(&mut self, placeholder: Placeholder);

    /// Remove the placeholder if one is shown.
    fn clear_placeholder(&mut self);

    /// Drop every rendered turn (session switch, new chat).
    fn clear_transcript(&mut self);

    /// Enable or disable the input controls. When disabled, `owner` names
    /// the session owner for the explanatory placeholder.
    fn set_input_editable(&mut self, editable: bool, owner: Option<&str>);

    /// Replace the rendered directory with the currently visible entries.
    fn render_directory(&mut self, entries: &[SessionListEntry]);

    /// Open the code viewer with a block's body and language hint.
    fn open_code_viewer(&mut self, content: &str, lang: &str);

    /// Close the code viewer.
    fn close_code_viewer(&mut self);

    /// Drop any staged-attachment previews.
    fn clear_staged_previews(&mut self);

    /// Refresh the provider picker: `(provider, restricted)` pairs plus the
    /// current selection.
    fn render_provider_availability(
        &mut self,
        availability: &[(Provider, bool)],
        current: Provider,
    );
}
