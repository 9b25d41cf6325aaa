//! Type-directed output rendering
//!
//! A renderer is picked per output mode from the *family* a type declares, so one renderer
//! serves every resource sharing a data shape. Renderers are stateless; callers render one
//! value per call and own any loop over a sequence.

pub mod json;
pub mod table;

use async_trait::async_trait;
use clap::ValueEnum;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{ContextError, ContextResult};

pub use json::JsonRendererFactory;
pub use table::TableRendererFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RenderMode {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Only meaningful for json
    pub indented: bool,
}

/// Shape family a type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFamily {
    /// A management resource wrapping a data payload
    ArmResource,
    /// Anything else
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub family: ResourceFamily,
}

/// Fields shared by every tracked (located) resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedResourceData {
    pub resource_type: String,
    pub location: String,
    pub id: String,
    pub name: String,
}

impl TrackedResourceData {
    /// Labelled fields in display order
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("Resource Type", self.resource_type.as_str()),
            ("Location", self.location.as_str()),
            ("Id", self.id.as_str()),
            ("Name", self.name.as_str()),
        ]
    }
}

/// Known payload shapes of a resource's data
#[derive(Debug, Clone, PartialEq)]
pub enum ResourcePayload<'a> {
    Tracked {
        fields: TrackedResourceData,
        raw: &'a Value,
    },
    Other {
        type_name: &'static str,
        raw: &'a Value,
    },
}

impl ResourcePayload<'_> {
    pub fn raw(&self) -> &Value {
        match self {
            ResourcePayload::Tracked { raw, .. } | ResourcePayload::Other { raw, .. } => raw,
        }
    }
}

/// A value that can be handed to a renderer
pub trait Renderable: Send + Sync {
    fn type_descriptor(&self) -> TypeDescriptor;

    /// The data payload; `None` when the resource carries no data
    fn payload(&self) -> Option<ResourcePayload<'_>>;
}

/// Types whose descriptor is known without an instance
pub trait Described {
    fn descriptor() -> TypeDescriptor;
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        output: &mut (dyn AsyncWrite + Unpin + Send),
        value: &dyn Renderable,
        cancel: &CancellationToken,
    ) -> ContextResult<()>;
}

/// Decides which renderer serves a type family, for one output mode
pub trait RendererFactory: Send + Sync {
    fn create_renderer(&self, for_type: &TypeDescriptor) -> ContextResult<Box<dyn Renderer>>;
}

pub fn renderer_factory(mode: RenderMode, options: RenderOptions) -> Box<dyn RendererFactory> {
    match mode {
        RenderMode::Table => Box::new(TableRendererFactory),
        RenderMode::Json => Box::new(JsonRendererFactory::new(options)),
    }
}

pub fn get_renderer(
    mode: RenderMode,
    options: RenderOptions,
    for_type: &TypeDescriptor,
) -> ContextResult<Box<dyn Renderer>> {
    renderer_factory(mode, options).create_renderer(for_type)
}

/// `get_renderer` for a statically known type
pub fn renderer_for<T: Described>(mode: RenderMode, options: RenderOptions) -> ContextResult<Box<dyn Renderer>> {
    get_renderer(mode, options, &T::descriptor())
}

/// Write everything and flush, aborting if the invocation is cancelled
pub(crate) async fn write_all(
    output: &mut (dyn AsyncWrite + Unpin + Send),
    bytes: &[u8],
    cancel: &CancellationToken,
) -> ContextResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ContextError::Cancelled),
        result = async {
            output.write_all(bytes).await?;
            output.flush().await
        } => Ok(result?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_is_table() {
        assert_eq!(RenderMode::default(), RenderMode::Table);
        assert!(!RenderOptions::default().indented);
    }

    #[test]
    fn test_tracked_fields_order() {
        let data = TrackedResourceData {
            resource_type: "t".into(),
            location: "l".into(),
            id: "i".into(),
            name: "n".into(),
        };
        let labels: Vec<_> = data.fields().into_iter().map(|(k, _)| k).collect();
        assert_eq!(labels, ["Resource Type", "Location", "Id", "Name"]);
    }

    #[tokio::test]
    async fn test_write_all_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut out = Vec::<u8>::new();
        let result = write_all(&mut out, b"hello", &cancel).await;
        assert!(matches!(result, Err(ContextError::Cancelled)));
    }
}
