use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use super::{
    RenderOptions, Renderable, Renderer, RendererFactory, ResourceFamily, TypeDescriptor, write_all,
};
use crate::error::{ContextError, ContextResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRendererFactory {
    options: RenderOptions,
}

impl JsonRendererFactory {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }
}

impl RendererFactory for JsonRendererFactory {
    fn create_renderer(&self, for_type: &TypeDescriptor) -> ContextResult<Box<dyn Renderer>> {
        match for_type.family {
            ResourceFamily::ArmResource => Ok(Box::new(JsonArmResourceRenderer {
                options: self.options,
            })),
            ResourceFamily::Plain => Err(ContextError::unsupported("JSON", for_type.name)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct JsonArmResourceRenderer {
    options: RenderOptions,
}

impl JsonArmResourceRenderer {
    fn serialize(&self, value: &Value) -> ContextResult<String> {
        let text = if self.options.indented {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        text.map_err(|e| ContextError::Remote(e.into()))
    }
}

#[async_trait]
impl Renderer for JsonArmResourceRenderer {
    async fn render(
        &self,
        output: &mut (dyn AsyncWrite + Unpin + Send),
        value: &dyn Renderable,
        cancel: &CancellationToken,
    ) -> ContextResult<()> {
        let descriptor = value.type_descriptor();
        if descriptor.family != ResourceFamily::ArmResource {
            return Err(ContextError::unsupported("JSON", descriptor.name));
        }

        let mut text = match value.payload() {
            Some(payload) => self.serialize(payload.raw())?,
            None => self.serialize(&Value::Null)?,
        };
        text.push('\n');
        write_all(output, text.as_bytes(), cancel).await
    }
}
