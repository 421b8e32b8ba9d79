use bevy::{
    prelude::*,
    reflect::TypeUuid,
    render::render_resource::{AsBindGroup, ShaderRef},
};

/// Shows a portal render target, sampled in screen space so that the captured view lines up with
/// the scene around the portal.
#[derive(AsBindGroup, Debug, Clone, TypeUuid)]
#[uuid = "04901b22-de12-43a9-8e2e-79d333201b93"]
pub struct PortalMaterial {
    #[texture(0)]
    #[sampler(1)]
    pub texture: Handle<Image>,
}

impl Material for PortalMaterial {
    fn fragment_shader() -> ShaderRef {
        "shaders/portal.wgsl".into()
    }
}
