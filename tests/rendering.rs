//! Renderer dispatch by type family

use maz::api::ResourceGroupResource;
use maz::error::ContextError;
use maz::render::{
    RenderMode, RenderOptions, Renderable, ResourceFamily, ResourcePayload, TypeDescriptor, get_renderer,
    renderer_for,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

fn resource_group() -> ResourceGroupResource {
    ResourceGroupResource::from_value(json!({
        "id": "/subscriptions/x/resourceGroups/y",
        "name": "y",
        "type": "Microsoft.Resources/resourceGroups",
        "location": "eastus",
        "tags": {"env": "prod"},
        "properties": {"provisioningState": "Succeeded"}
    }))
    .unwrap()
}

async fn render(mode: RenderMode, options: RenderOptions, value: &dyn Renderable) -> Result<String, ContextError> {
    let renderer = get_renderer(mode, options, &value.type_descriptor())?;
    let mut output = Vec::<u8>::new();
    renderer.render(&mut output, value, &CancellationToken::new()).await?;
    Ok(String::from_utf8(output).unwrap())
}

/// A resource whose payload is not one of the known shapes
struct UnknownPayload(Value);

impl Renderable for UnknownPayload {
    fn type_descriptor(&self) -> TypeDescriptor {
        TypeDescriptor {
            name: "tests::UnknownPayload",
            family: ResourceFamily::ArmResource,
        }
    }

    fn payload(&self) -> Option<ResourcePayload<'_>> {
        Some(ResourcePayload::Other {
            type_name: "tests::StorageAccountData",
            raw: &self.0,
        })
    }
}

/// A resource with no data at all
struct EmptyResource;

impl Renderable for EmptyResource {
    fn type_descriptor(&self) -> TypeDescriptor {
        TypeDescriptor {
            name: "tests::EmptyResource",
            family: ResourceFamily::ArmResource,
        }
    }

    fn payload(&self) -> Option<ResourcePayload<'_>> {
        None
    }
}

#[tokio::test]
async fn test_table_layout_for_resource_group() {
    let text = render(RenderMode::Table, RenderOptions::default(), &resource_group())
        .await
        .unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        [
            "Resource Type:    Microsoft.Resources/resourceGroups",
            "  Location:         eastus",
            "  Id:               /subscriptions/x/resourceGroups/y",
            "  Name:             y",
        ]
    );
    assert!(text.ends_with('\n'));
}

#[tokio::test]
async fn test_json_is_verbatim_payload() {
    let group = resource_group();
    let text = render(RenderMode::Json, RenderOptions { indented: false }, &group)
        .await
        .unwrap();
    assert_eq!(text.trim_end(), serde_json::to_string(group.data()).unwrap());

    let indented = render(RenderMode::Json, RenderOptions { indented: true }, &group)
        .await
        .unwrap();
    assert!(indented.starts_with("{\n  \"id\": \"/subscriptions/x/resourceGroups/y\","));
    let reparsed: Value = serde_json::from_str(&indented).unwrap();
    assert_eq!(&reparsed, group.data());
}

#[tokio::test]
async fn test_unknown_payload_shape_names_the_payload_type() {
    let value = UnknownPayload(json!({"kind": "StorageV2"}));
    let err = render(RenderMode::Table, RenderOptions::default(), &value)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "No table renderer available for type tests::StorageAccountData"
    );
    assert_eq!(err.exit_code(), 8);

    // json does not project fields, so any payload shape works
    let text = render(RenderMode::Json, RenderOptions::default(), &value)
        .await
        .unwrap();
    assert_eq!(text, "{\"kind\":\"StorageV2\"}\n");
}

#[tokio::test]
async fn test_null_payload_renders_nothing_in_table_mode() {
    let text = render(RenderMode::Table, RenderOptions::default(), &EmptyResource)
        .await
        .unwrap();
    assert!(text.is_empty());
}

#[test]
fn test_unrecognised_family_is_unsupported() {
    let descriptor = TypeDescriptor {
        name: "tests::Widget",
        family: ResourceFamily::Plain,
    };
    for mode in [RenderMode::Table, RenderMode::Json] {
        let err = get_renderer(mode, RenderOptions::default(), &descriptor).err().unwrap();
        assert!(matches!(err, ContextError::UnsupportedType { ref type_name, .. } if type_name == "tests::Widget"));
    }
}

#[tokio::test]
async fn test_renderer_is_reusable_across_values() {
    let renderer = renderer_for::<ResourceGroupResource>(RenderMode::Table, RenderOptions::default()).unwrap();
    let mut output = Vec::<u8>::new();
    let cancel = CancellationToken::new();
    renderer.render(&mut output, &resource_group(), &cancel).await.unwrap();
    renderer.render(&mut output, &resource_group(), &cancel).await.unwrap();
    let text = String::from_utf8(output).unwrap();
    assert_eq!(text.matches("Resource Type:").count(), 2);
}

#[tokio::test]
async fn test_cancelled_render_writes_nothing() {
    let renderer = renderer_for::<ResourceGroupResource>(RenderMode::Json, RenderOptions::default()).unwrap();
    let mut output = Vec::<u8>::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = renderer
        .render(&mut output, &resource_group(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::Cancelled));
    assert!(output.is_empty());
}
