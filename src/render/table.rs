use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use super::{
    Renderable, Renderer, RendererFactory, ResourceFamily, ResourcePayload, TypeDescriptor, write_all,
};
use crate::error::{ContextError, ContextResult};

const HEADLINE_LABEL: &str = "Resource Type";
const LABEL_GAP: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct TableRendererFactory;

impl RendererFactory for TableRendererFactory {
    fn create_renderer(&self, for_type: &TypeDescriptor) -> ContextResult<Box<dyn Renderer>> {
        match for_type.family {
            ResourceFamily::ArmResource => Ok(Box::new(TableArmResourceRenderer)),
            ResourceFamily::Plain => Err(ContextError::unsupported("table", for_type.name)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TableArmResourceRenderer;

#[async_trait]
impl Renderer for TableArmResourceRenderer {
    async fn render(
        &self,
        output: &mut (dyn AsyncWrite + Unpin + Send),
        value: &dyn Renderable,
        cancel: &CancellationToken,
    ) -> ContextResult<()> {
        let descriptor = value.type_descriptor();
        if descriptor.family != ResourceFamily::ArmResource {
            return Err(ContextError::unsupported("table", descriptor.name));
        }

        let fields = match value.payload() {
            None => return Ok(()),
            Some(ResourcePayload::Tracked { fields, .. }) => fields,
            Some(ResourcePayload::Other { type_name, .. }) => {
                return Err(ContextError::unsupported("table", type_name));
            }
        };

        let lines = table_lines(&fields.fields());
        if lines.is_empty() {
            return Ok(());
        }
        let mut text = lines.join("\n");
        text.push('\n');
        write_all(output, text.as_bytes(), cancel).await
    }
}

/// Headline first (resource type when present, else the first field), then the rest indented
pub fn table_lines(fields: &[(&str, &str)]) -> Vec<String> {
    let Some(max_label) = fields.iter().map(|(label, _)| label.len()).max() else {
        return Vec::new();
    };

    let headline = fields
        .iter()
        .position(|(label, _)| *label == HEADLINE_LABEL)
        .unwrap_or(0);

    let line = |label: &str, value: &str| {
        let padding = " ".repeat(max_label - label.len() + LABEL_GAP);
        format!("{label}:{padding}{value}")
    };

    let (label, value) = fields[headline];
    let mut lines = vec![line(label, value)];
    lines.extend(
        fields
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != headline)
            .map(|(_, (label, value))| format!("  {}", line(label, value))),
    );
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headline_is_resource_type_even_when_not_first() {
        let lines = table_lines(&[("Name", "y"), ("Resource Type", "t")]);
        assert_eq!(lines[0], "Resource Type:    t");
        assert_eq!(lines[1], "  Name:             y");
    }

    #[test]
    fn test_headline_falls_back_to_first_field() {
        let lines = table_lines(&[("Id", "1"), ("Location", "westus")]);
        assert_eq!(lines, ["Id:          1", "  Location:    westus"]);
    }

    #[test]
    fn test_no_fields_no_lines() {
        assert!(table_lines(&[]).is_empty());
    }

    #[test]
    fn test_plain_family_is_unsupported() {
        let err = TableRendererFactory
            .create_renderer(&TypeDescriptor {
                name: "maz::Widget",
                family: ResourceFamily::Plain,
            })
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "No table renderer available for type maz::Widget");
    }
}
