//! Server Render Entry Point
//!
//! One call: open a scope, run the component factory, drain its async
//! work, capture the payload, serialize the markup. The returned bundle is
//! everything the client needs — the HTML string and the hydration data to
//! embed alongside it.
//!
//! A failed render returns no payload, but the scope is still cleared so no
//! cells leak; the caller decides what to serve instead.

use crate::dom::{Document, DomNode};
use crate::error::RenderError;
use crate::hydrate::HydrationPayload;
use crate::reactive::RenderScope;

/// Options for one render.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Request path, installed as an ephemeral cell on the scope for a
    /// routing layer to consume. Never captured.
    pub path: Option<String>,

    /// Keep the scope (and its cells) alive after capture instead of
    /// clearing it. The kept scope is returned on [`Rendered::scope`].
    pub keep_scope: bool,
}

/// A completed render.
#[derive(Debug)]
pub struct Rendered {
    /// The serialized markup, markers included.
    pub html: String,

    /// The captured payload to ship alongside the markup.
    pub hydration_data: HydrationPayload,

    /// The scope, when [`RenderOptions::keep_scope`] asked for it.
    pub scope: Option<RenderScope>,
}

/// Render a component factory to markup plus hydration data.
///
/// The factory runs with a fresh scope active, so every cell it creates
/// registers in creation order. Asynchronous work started via
/// [`RenderScope::track`] is drained before capture, so the markup and the
/// captured values both reflect the settled state.
pub async fn render_to_string<F>(factory: F, options: RenderOptions) -> Result<Rendered, RenderError>
where
    F: FnOnce(&Document) -> DomNode,
{
    let scope = RenderScope::new();
    if let Some(path) = options.path {
        scope.set_path(path);
    }
    let document = Document::new();

    let root = match scope.run(|| factory(&document)) {
        Ok(root) => root,
        Err(err) => {
            scope.clear();
            return Err(err.into());
        }
    };

    if let Err(err) = scope.drain().await {
        scope.clear();
        return Err(err.into());
    }

    let hydration_data = match scope.capture(document.take_regions()) {
        Ok(payload) => payload,
        Err(err) => {
            scope.clear();
            return Err(err.into());
        }
    };

    let html = root.to_html();
    let scope = if options.keep_scope {
        Some(scope)
    } else {
        scope.clear();
        None
    };

    Ok(Rendered {
        html,
        hydration_data,
        scope,
    })
}
