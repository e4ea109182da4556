//! Document bridge.
//!
//! The narrow boundary between a session and the text-editing widget. The
//! widget reports every content change together with an [`EditOrigin`];
//! changes the bridge applied on behalf of a peer come back tagged
//! [`EditOrigin::Remote`] and are never forwarded, which is what keeps two
//! peers from echoing a snapshot back and forth.

/// Where a content change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    /// The local user edited the document.
    User,
    /// The bridge applied a snapshot received from a peer.
    Remote,
}

/// A change notification from the editing surface. Carries the whole text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditEvent {
    /// Full document text after the change.
    pub text: String,
    /// Origin of the change.
    pub origin: EditOrigin,
}

/// The external text-editing widget.
pub trait EditorSurface {
    /// Current full content.
    fn content(&self) -> String;

    /// Replace the full content. Implementations must report a change
    /// carrying `origin` if the content actually changed.
    fn replace(&mut self, text: &str, origin: EditOrigin);

    /// Drain change notifications accumulated since the last call.
    fn take_changes(&mut self) -> Vec<EditEvent>;
}

/// In-memory editing surface.
#[derive(Debug, Default, Clone)]
pub struct TextBuffer {
    text: String,
    changes: Vec<EditEvent>,
}

impl TextBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer that already holds `text`.
    #[must_use]
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            changes: Vec::new(),
        }
    }
}

impl EditorSurface for TextBuffer {
    fn content(&self) -> String {
        self.text.clone()
    }

    fn replace(&mut self, text: &str, origin: EditOrigin) {
        if self.text == text {
            return;
        }
        self.text = text.to_string();
        self.changes.push(EditEvent {
            text: self.text.clone(),
            origin,
        });
    }

    fn take_changes(&mut self) -> Vec<EditEvent> {
        std::mem::take(&mut self.changes)
    }
}

/// Wraps an [`EditorSurface`] and separates local edits from remote applies.
#[derive(Debug)]
pub struct DocumentBridge<E> {
    surface: E,
    has_document: bool,
}

impl<E: EditorSurface> DocumentBridge<E> {
    /// Wrap a surface. A surface that starts with content holds a document.
    #[must_use]
    pub fn new(surface: E) -> Self {
        let has_document = !surface.content().is_empty();
        Self {
            surface,
            has_document,
        }
    }

    /// Current full text.
    #[must_use]
    pub fn text(&self) -> String {
        self.surface.content()
    }

    /// Whether this side has seen any document content, local or remote.
    #[must_use]
    pub fn has_document(&self) -> bool {
        self.has_document
    }

    /// Replace the content with a peer's snapshot.
    ///
    /// Never produces a local edit. Applying the text the surface already
    /// holds is a no-op; returns whether the content changed.
    pub fn apply_remote(&mut self, text: &str) -> bool {
        self.has_document = true;
        if self.surface.content() == text {
            return false;
        }
        self.surface.replace(text, EditOrigin::Remote);
        true
    }

    /// Replace the content as if the user typed it.
    pub fn edit(&mut self, text: &str) {
        self.surface.replace(text, EditOrigin::User);
    }

    /// Drain the surface's notifications and return the texts of user edits,
    /// oldest first.
    pub fn local_edits(&mut self) -> Vec<String> {
        let changes = self.surface.take_changes();
        if !changes.is_empty() {
            self.has_document = true;
        }
        changes
            .into_iter()
            .filter(|change| change.origin == EditOrigin::User)
            .map(|change| change.text)
            .collect()
    }

    /// The wrapped surface.
    #[must_use]
    pub fn surface(&self) -> &E {
        &self.surface
    }

    /// Mutable access to the wrapped surface.
    pub fn surface_mut(&mut self) -> &mut E {
        &mut self.surface
    }
}
